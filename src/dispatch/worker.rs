//! One worker: take an article, encode it, post it over a pooled session

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::health::ServerHealth;
use super::queue::{Ticket, WorkQueue};
use crate::aggregate::ResultAggregator;
use crate::article::{ArticleBuilder, EncodedArticle, USER_AGENT, generate_message_id};
use crate::config::{Config, PostingConfig};
use crate::error::{FailureKind, NntpError, PostError, PostResult};
use crate::job::{Article, PostJob};
use crate::pool::ServerPool;
use crate::segment::read_range;
use crate::yenc::{self, PartInfo};

/// Pool and health record of one server
#[derive(Debug)]
pub(crate) struct ServerSlot {
    pub pool: ServerPool,
    pub health: ServerHealth,
}

/// State shared by every worker of a run
pub(crate) struct RunContext {
    pub config: Arc<Config>,
    pub jobs: Arc<[PostJob]>,
    pub queue: WorkQueue,
    pub aggregator: Arc<ResultAggregator>,
    pub servers: Vec<Arc<ServerSlot>>,
    pub limiter: Option<Arc<Semaphore>>,
    pub cancel: CancellationToken,
    pub message_id_domain: String,
}

impl RunContext {
    fn article(&self, ticket: &Ticket) -> (&PostJob, &Article) {
        let job = &self.jobs[ticket.job];
        (job, &job.articles[ticket.article])
    }

    /// Settle a ticket as permanently failed
    fn fail(&self, ticket: &Ticket, error: PostError) {
        let (job, article) = self.article(ticket);
        self.aggregator.record_failure(job.id, article.part, error);
        self.queue.complete();
    }

    /// Put a ticket back, or fail it when every server is gone
    fn requeue(&self, ticket: Ticket, delay: std::time::Duration, reason: &str) {
        // Before the push, another worker may take it at once
        let (job, article) = self.article(&ticket);
        self.aggregator.record_requeued(job.id, article.part);
        if let Err(ticket) = self.queue.requeue(ticket, delay) {
            self.fail(&ticket, PostError::NoServerAvailable(reason.to_string()));
        }
    }

    /// Disable a server; when it was the last one, fail everything queued
    fn kill_server(&self, server: &ServerSlot, reason: &str) {
        if !server.health.kill(reason) {
            return;
        }
        if self.servers.iter().all(|s| s.health.is_dead()) {
            warn!("Every server is disabled, failing remaining articles");
            for ticket in self.queue.close() {
                let (job, article) = self.article(&ticket);
                self.aggregator.record_failure(
                    job.id,
                    article.part,
                    PostError::NoServerAvailable(reason.to_string()),
                );
            }
        }
    }
}

/// Read, verify, encode and wrap one article
///
/// # Errors
///
/// [`PostError::File`] when the range cannot be read, [`PostError::Encoding`]
/// when the data changed since the scan or the encoded body does not decode
/// back to it.
pub(crate) async fn prepare_article(
    posting: &PostingConfig,
    message_id_domain: &str,
    job: &PostJob,
    article: &Article,
) -> PostResult<EncodedArticle> {
    let data = read_range(&job.path, &article.range()).await?;
    if crc32fast::hash(&data) != article.crc32 {
        return Err(PostError::Encoding(format!(
            "{} changed since it was scanned (part {})",
            job.path.display(),
            article.part
        )));
    }

    let info = PartInfo {
        name: &job.file_name,
        part: article.part,
        total: article.total,
        offset: article.offset,
        file_size: job.file_size,
        file_crc32: Some(job.file_crc32),
    };
    let body = yenc::encode_part(&data, &info, posting.line_length)?;

    if posting.verify_encoding {
        let decoded = yenc::decode(&body)?;
        if decoded.data != data || !decoded.verify_crc32() {
            return Err(PostError::Encoding(format!(
                "part {} of {} does not decode back to its source",
                article.part,
                job.path.display()
            )));
        }
    }

    ArticleBuilder::new()
        .from(posting.from.as_str())
        .subject(job.subject.render(&job.file_name, article.part, article.total))
        .newsgroups(job.newsgroups.clone())
        .message_id(generate_message_id(job.id.0, article.part, message_id_domain))
        .user_agent(USER_AGENT)
        .body(body)
        .build()
}

/// Sleep for a backoff delay unless the run is cancelled first
async fn backoff(cancel: &CancellationToken, delay: std::time::Duration) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Worker loop bound to one server
pub(crate) async fn run_worker(ctx: Arc<RunContext>, server: Arc<ServerSlot>, slot: u32) {
    let name = server.pool.name().to_string();
    trace!(server = %name, slot, "worker started");

    loop {
        if ctx.cancel.is_cancelled() || server.health.is_dead() {
            break;
        }

        let permit = match &ctx.limiter {
            Some(limiter) => tokio::select! {
                permit = limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                _ = ctx.cancel.cancelled() => break,
            },
            None => None,
        };

        let Some(mut ticket) = ctx.queue.pop(&ctx.cancel).await else {
            break;
        };
        if server.health.is_dead() {
            ctx.requeue(ticket, std::time::Duration::ZERO, "server disabled");
            break;
        }

        let (job, article) = ctx.article(&ticket);
        let (job_id, part, len) = (job.id, article.part, article.len);
        ctx.aggregator.record_in_flight(job_id, part);

        let encoded = match prepare_article(
            &ctx.config.posting,
            &ctx.message_id_domain,
            job,
            article,
        )
        .await
        {
            Ok(encoded) => encoded,
            Err(e) => {
                ctx.fail(&ticket, e);
                continue;
            }
        };

        let mut session = match server.pool.acquire().await {
            Ok(session) => {
                server.health.record_connect_success();
                session
            }
            Err(e) => {
                // Not the article's fault: it goes back without using an attempt
                let reason = e.to_string();
                ctx.requeue(ticket, std::time::Duration::ZERO, &reason);

                match e.failure_kind(&ctx.config.responses) {
                    FailureKind::ServerFatal => {
                        ctx.kill_server(&server, &reason);
                        break;
                    }
                    FailureKind::Retryable | FailureKind::Rejected => {
                        let failures = server.health.record_connect_failure();
                        if failures >= ctx.config.retry.max_attempts {
                            ctx.kill_server(
                                &server,
                                &format!("{} consecutive connection failures: {}", failures, reason),
                            );
                            break;
                        }
                        let delay = ctx.config.retry.backoff(failures);
                        warn!(
                            server = %name,
                            attempt = failures,
                            "Connection failed, retrying in {:?}: {}",
                            delay,
                            reason
                        );
                        drop(permit);
                        backoff(&ctx.cancel, delay).await;
                        continue;
                    }
                }
            }
        };

        match session.post(&encoded).await {
            Ok(()) => {
                debug!(server = %name, job = %job_id, part, "article posted");
                server.health.record_posted(len);
                ctx.aggregator.record_success(job_id, part, len);
                ctx.queue.complete();
            }
            Err(e) => {
                server.health.record_post_failure();
                let kind = e.failure_kind(&ctx.config.responses);
                if kind == FailureKind::ServerFatal {
                    session.mark_broken();
                }
                drop(session);
                handle_post_failure(&ctx, &server, &mut ticket, e, kind);
            }
        }
    }

    trace!(server = %name, slot, "worker stopped");
}

/// Route a failed POST according to its classification
fn handle_post_failure(
    ctx: &RunContext,
    server: &ServerSlot,
    ticket: &mut Ticket,
    error: NntpError,
    kind: FailureKind,
) {
    let name = server.pool.name();
    let (job, article) = ctx.article(ticket);
    let (job_id, part) = (job.id, article.part);

    match kind {
        FailureKind::Rejected => {
            ctx.fail(
                ticket,
                PostError::Nntp {
                    server: name.to_string(),
                    source: error,
                },
            );
        }
        FailureKind::ServerFatal => {
            let reason = error.to_string();
            ctx.kill_server(server, &reason);
            ctx.requeue(*ticket, std::time::Duration::ZERO, &reason);
        }
        FailureKind::Retryable => {
            ticket.attempts += 1;
            if ticket.attempts >= ctx.config.retry.max_attempts {
                warn!(
                    server = %name,
                    job = %job_id,
                    part,
                    attempt = ticket.attempts,
                    "giving up: {}",
                    error
                );
                ctx.fail(
                    ticket,
                    PostError::Nntp {
                        server: name.to_string(),
                        source: error,
                    },
                );
            } else {
                let delay = ctx.config.retry.backoff(ticket.attempts);
                warn!(
                    server = %name,
                    job = %job_id,
                    part,
                    attempt = ticket.attempts,
                    "Post failed, retrying in {:?}: {}",
                    delay,
                    error
                );
                ctx.requeue(*ticket, delay, &error.to_string());
            }
        }
    }
}
