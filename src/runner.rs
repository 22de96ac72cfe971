//! Entry points: plan a request, post it, summarize

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregate::{PostSummary, ResultAggregator};
use crate::config::Config;
use crate::dispatch::Spawner;
use crate::error::{PostError, PostResult};
use crate::job::{PostRequest, plan_jobs};

/// Post the files of a request
///
/// Per-job and per-article failures are reported in the summary, never as
/// `Err`.
///
/// # Errors
///
/// [`PostError::Config`] when the configuration or the request is invalid.
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{Config, PostRequest, PostingConfig, ServerConfig, ServerRegistry, SubjectMode};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::new(
///     PostingConfig::new("poster <poster@example.com>", "alt.binaries.test"),
///     ServerRegistry::new().with_server(
///         "primary",
///         ServerConfig::tls("news.example.com", "user", "pass").with_connections(8),
///     ),
/// );
/// let request = PostRequest::new(
///     vec!["holiday.mkv".into()],
///     SubjectMode::Explicit("Holiday".to_string()),
/// );
///
/// let summary = nntp_poster::post(config, request, CancellationToken::new()).await?;
/// std::process::exit(summary.exit_code());
/// # }
/// ```
pub async fn post(
    config: Config,
    request: PostRequest,
    cancel: CancellationToken,
) -> PostResult<PostSummary> {
    config.validate()?;
    request.validate()?;
    let started = Instant::now();
    let config = Arc::new(config);

    let mut plan = plan_jobs(&config, &request).await?;
    let aggregator = Arc::new(ResultAggregator::new(&mut plan));
    info!(
        "Posting {} files to {}",
        plan.jobs.len(),
        request
            .newsgroups
            .as_ref()
            .map(|groups| groups.join(","))
            .unwrap_or_else(|| config.posting.default_group.clone())
    );

    let servers = Spawner::new(config)
        .run(plan.jobs, aggregator.clone(), cancel)
        .await;
    Ok(aggregator.finish(servers, started.elapsed()))
}

/// Blocking variant of [`post`] on its own multi-thread runtime
///
/// Runs to completion without cancellation.
///
/// # Errors
///
/// As [`post`]; also [`PostError::Config`] if the runtime cannot start.
pub fn post_files(config: Config, request: PostRequest) -> PostResult<PostSummary> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| PostError::Config(format!("cannot start async runtime: {}", e)))?;
    runtime.block_on(post(config, request, CancellationToken::new()))
}
