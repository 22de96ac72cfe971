//! Concurrent posting across every configured server
//!
//! # Architecture
//!
//! - `queue`: shared FIFO of article tickets with delayed re-queue
//! - `worker`: one task per connection slot; read, encode, POST, report
//! - `health`: per-server failure tracking; a dead server stays dead
//!
//! Every article of every job is seeded into one queue. Workers of all
//! servers pull from it, so a failing server's articles drain to the others.

mod health;
mod queue;
mod worker;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{ResultAggregator, ServerReport};
use crate::article::message_id_domain;
use crate::config::Config;
use crate::job::PostJob;
use crate::pool::ServerPool;

use health::ServerHealth;
use queue::{Ticket, WorkQueue};
use worker::{RunContext, ServerSlot, run_worker};

/// Runs the workers of one posting run
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{
///     Config, PostRequest, PostingConfig, ResultAggregator, ServerConfig, ServerRegistry,
///     Spawner, SubjectMode, plan_jobs,
/// };
/// use std::sync::Arc;
/// use std::time::Instant;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::new(
///     PostingConfig::new("poster <poster@example.com>", "alt.binaries.test"),
///     ServerRegistry::new().with_server(
///         "primary",
///         ServerConfig::tls("news.example.com", "user", "pass").with_connections(8),
///     ),
/// ));
/// let request = PostRequest::new(vec!["big.iso".into()], SubjectMode::Explicit("ISO".into()));
///
/// let mut plan = plan_jobs(&config, &request).await?;
/// let aggregator = Arc::new(ResultAggregator::new(&mut plan));
/// let started = Instant::now();
/// let servers = Spawner::new(config)
///     .run(plan.jobs, aggregator.clone(), CancellationToken::new())
///     .await;
/// let summary = aggregator.finish(servers, started.elapsed());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Spawner {
    config: Arc<Config>,
    servers: Vec<Arc<ServerSlot>>,
}

impl Spawner {
    /// Create one lazy pool and one health record per configured server
    pub fn new(config: Arc<Config>) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|(name, server)| {
                Arc::new(ServerSlot {
                    health: ServerHealth::new(name, server.address()),
                    pool: ServerPool::new(name, server.clone(), config.timeouts),
                })
            })
            .collect();
        Self { config, servers }
    }

    /// Post every article of `jobs`, reporting outcomes to `aggregator`
    ///
    /// Returns when every article reached a terminal state, every server is
    /// disabled, or `cancel` fired. After cancellation in-flight posts get
    /// `shutdown_grace` to finish before their workers are aborted. Idle
    /// sessions are closed with QUIT before returning.
    pub async fn run(
        self,
        jobs: Vec<PostJob>,
        aggregator: Arc<ResultAggregator>,
        cancel: CancellationToken,
    ) -> Vec<ServerReport> {
        let tickets: Vec<Ticket> = jobs
            .iter()
            .enumerate()
            .flat_map(|(job, j)| {
                (0..j.articles.len()).map(move |article| Ticket {
                    job,
                    article,
                    attempts: 0,
                })
            })
            .collect();
        let article_count = tickets.len();

        let message_id_domain = self
            .config
            .posting
            .message_id_domain
            .clone()
            .unwrap_or_else(|| message_id_domain(&self.config.posting.from).to_string());

        let ctx = Arc::new(RunContext {
            limiter: self
                .config
                .max_connections
                .map(|cap| Arc::new(Semaphore::new(cap as usize))),
            config: self.config.clone(),
            jobs: jobs.into(),
            queue: WorkQueue::new(tickets),
            aggregator,
            servers: self.servers.clone(),
            cancel: cancel.clone(),
            message_id_domain,
        });

        let mut workers = JoinSet::new();
        if article_count > 0 {
            for server in &self.servers {
                for slot in 0..server.pool.config().connections {
                    workers.spawn(run_worker(ctx.clone(), server.clone(), slot));
                }
            }
        }
        info!(
            "Posting {} articles with {} workers on {} servers",
            article_count,
            workers.len(),
            self.servers.len()
        );

        let cancelled = tokio::select! {
            _ = join_workers(&mut workers) => false,
            _ = cancel.cancelled() => true,
        };
        if cancelled {
            let grace = self.config.shutdown_grace;
            info!("Cancellation requested, waiting up to {:?} for in-flight posts", grace);
            if timeout(grace, join_workers(&mut workers)).await.is_err() {
                warn!("Grace period elapsed, aborting {} workers", workers.len());
                workers.abort_all();
                join_workers(&mut workers).await;
            }
        }
        debug!("{} articles left outstanding", ctx.queue.outstanding());
        drop(ctx);

        for server in &self.servers {
            server.pool.drain().await;
        }
        self.servers.iter().map(|s| s.health.report()).collect()
    }
}

async fn join_workers(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result
            && e.is_panic()
        {
            warn!("Worker panicked: {}", e);
        }
    }
}
