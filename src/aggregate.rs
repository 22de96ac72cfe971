//! Per-job result tracking and the final run summary
//!
//! Every article outcome goes through [`ResultAggregator`]. Each job has its
//! own lock, so outcomes of different jobs never contend.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PostError;
use crate::job::{ArticleStatus, JobId, JobPlan, JobStatus};

/// A permanent failure, attributed to a job and optionally a part
#[derive(Debug)]
pub struct JobError {
    /// Failed job
    pub job: JobId,
    /// Path of the job's file
    pub path: PathBuf,
    /// Failed part, `None` for job-level errors
    pub part: Option<u32>,
    /// What went wrong
    pub error: PostError,
}

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct JobReport {
    /// Position in the run
    pub id: JobId,
    /// Path of the file (or of the unreadable input)
    pub path: PathBuf,
    /// Final status
    pub status: JobStatus,
    /// Number of articles planned
    pub parts_total: u32,
    /// Articles accepted by a server
    pub parts_posted: u32,
    /// Articles that failed permanently
    pub parts_failed: u32,
    /// Payload bytes of the posted articles
    pub bytes_posted: u64,
    /// First error, if any
    pub error: Option<String>,
}

/// Per-server statistics of a run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServerReport {
    /// Registry name
    pub name: String,
    /// `host:port`
    pub address: String,
    /// Articles this server accepted
    pub articles_posted: u64,
    /// Payload bytes this server accepted
    pub bytes_posted: u64,
    /// Failed session opens and failed POST exchanges
    pub failed_attempts: u64,
    /// Why the server was disabled, if it was
    pub disabled: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug)]
pub struct PostSummary {
    /// Jobs in the run, rejected ones included
    pub jobs_total: usize,
    /// Jobs whose every article was posted
    pub jobs_succeeded: usize,
    /// Jobs that did not succeed (failed or left incomplete)
    pub jobs_failed: usize,
    /// Articles accepted by a server
    pub articles_posted: u64,
    /// Articles that failed permanently
    pub articles_failed: u64,
    /// Payload bytes posted
    pub bytes_posted: u64,
    /// Every permanent failure
    pub errors: Vec<JobError>,
    /// Per-job reports, in job order
    pub jobs: Vec<JobReport>,
    /// Per-server reports, in registry order
    pub servers: Vec<ServerReport>,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl PostSummary {
    /// Whether every job succeeded
    pub fn is_success(&self) -> bool {
        self.jobs_succeeded == self.jobs_total
    }

    /// Process exit code: 0 if every job succeeded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Delivery state of one job
#[derive(Debug)]
struct JobTracker {
    id: JobId,
    path: PathBuf,
    parts: Vec<ArticleStatus>,
    posted: u32,
    failed: u32,
    bytes_posted: u64,
    status: JobStatus,
    errors: Vec<JobError>,
}

impl JobTracker {
    fn update_status(&mut self) {
        // Failure is sticky; later outcomes still count
        if self.status == JobStatus::Failed {
            return;
        }
        self.status = if self.failed > 0 {
            JobStatus::Failed
        } else if self.posted as usize == self.parts.len() {
            JobStatus::Success
        } else if self.posted > 0 {
            JobStatus::Partial
        } else {
            JobStatus::Pending
        };
    }

    /// Move a part to a terminal state; false if it already was terminal
    fn settle(&mut self, part: u32, status: ArticleStatus) -> bool {
        let Some(slot) = part
            .checked_sub(1)
            .and_then(|index| self.parts.get_mut(index as usize))
        else {
            warn!(job = %self.id, part, "outcome for unknown part ignored");
            return false;
        };
        if slot.is_terminal() {
            debug!(job = %self.id, part, "duplicate outcome ignored");
            return false;
        }
        *slot = status;
        true
    }

    fn report(&self) -> JobReport {
        JobReport {
            id: self.id,
            path: self.path.clone(),
            status: self.status,
            parts_total: self.parts.len() as u32,
            parts_posted: self.posted,
            parts_failed: self.failed,
            bytes_posted: self.bytes_posted,
            error: self.errors.first().map(|e| e.error.to_string()),
        }
    }
}

/// Collects article outcomes into job states
///
/// The single update path for job and article status during a run.
#[derive(Debug)]
pub struct ResultAggregator {
    trackers: Vec<Mutex<JobTracker>>,
}

impl ResultAggregator {
    /// Track every job of a plan; rejected jobs start out failed
    ///
    /// Takes the rejected jobs' errors out of the plan. Job ids must be
    /// contiguous from 0, as [`plan_jobs`](crate::plan_jobs) assigns them.
    pub fn new(plan: &mut JobPlan) -> Self {
        let mut trackers: Vec<JobTracker> = plan
            .jobs
            .iter()
            .map(|job| JobTracker {
                id: job.id,
                path: job.path.clone(),
                parts: vec![ArticleStatus::Pending; job.articles.len()],
                posted: 0,
                failed: 0,
                bytes_posted: 0,
                status: JobStatus::Pending,
                errors: Vec::new(),
            })
            .collect();

        trackers.extend(plan.rejected.drain(..).map(|rejected| JobTracker {
            id: rejected.id,
            path: rejected.path.clone(),
            parts: Vec::new(),
            posted: 0,
            failed: 0,
            bytes_posted: 0,
            status: JobStatus::Failed,
            errors: vec![JobError {
                job: rejected.id,
                path: rejected.path,
                part: None,
                error: rejected.error,
            }],
        }));
        trackers.sort_by_key(|t| t.id);

        Self {
            trackers: trackers.into_iter().map(Mutex::new).collect(),
        }
    }

    // Job ids are contiguous from 0, so the id is the index
    fn tracker(&self, job: JobId) -> Option<std::sync::MutexGuard<'_, JobTracker>> {
        self.trackers
            .get(job.0)
            .map(|t| t.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Note that a worker took an article
    pub fn record_in_flight(&self, job: JobId, part: u32) {
        self.mark_open(job, part, ArticleStatus::InFlight);
    }

    /// Note that an article went back to the queue
    pub fn record_requeued(&self, job: JobId, part: u32) {
        self.mark_open(job, part, ArticleStatus::Pending);
    }

    fn mark_open(&self, job: JobId, part: u32, status: ArticleStatus) {
        if let Some(mut tracker) = self.tracker(job)
            && let Some(slot) = part
                .checked_sub(1)
                .and_then(|index| tracker.parts.get_mut(index as usize))
            && !slot.is_terminal()
        {
            *slot = status;
        }
    }

    /// Record an article accepted by a server
    pub fn record_success(&self, job: JobId, part: u32, bytes: u64) {
        let Some(mut tracker) = self.tracker(job) else {
            return;
        };
        if tracker.settle(part, ArticleStatus::Succeeded) {
            tracker.posted += 1;
            tracker.bytes_posted += bytes;
            tracker.update_status();
            if tracker.status == JobStatus::Success {
                info!(job = %job, path = %tracker.path.display(), "job posted");
            }
        }
    }

    /// Record an article that failed permanently
    pub fn record_failure(&self, job: JobId, part: u32, error: PostError) {
        let Some(mut tracker) = self.tracker(job) else {
            return;
        };
        if tracker.settle(part, ArticleStatus::Failed) {
            warn!(job = %job, part, "article failed: {}", error);
            tracker.failed += 1;
            let path = tracker.path.clone();
            tracker.errors.push(JobError {
                job,
                path,
                part: Some(part),
                error,
            });
            tracker.update_status();
        }
    }

    /// Current status of a job
    pub fn status(&self, job: JobId) -> Option<JobStatus> {
        self.tracker(job).map(|t| t.status)
    }

    /// Current state of one article (parts count from 1)
    pub fn article_status(&self, job: JobId, part: u32) -> Option<ArticleStatus> {
        let tracker = self.tracker(job)?;
        let index = part.checked_sub(1)?;
        tracker.parts.get(index as usize).copied()
    }

    /// Build the summary; jobs not finished are reported as interrupted
    ///
    /// Errors are moved into the summary, so this is meant to be called once.
    pub fn finish(&self, servers: Vec<ServerReport>, elapsed: Duration) -> PostSummary {
        let mut summary = PostSummary {
            jobs_total: self.trackers.len(),
            jobs_succeeded: 0,
            jobs_failed: 0,
            articles_posted: 0,
            articles_failed: 0,
            bytes_posted: 0,
            errors: Vec::new(),
            jobs: Vec::with_capacity(self.trackers.len()),
            servers,
            elapsed,
        };

        for tracker in &self.trackers {
            let mut tracker = tracker.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(tracker.status, JobStatus::Pending | JobStatus::Partial) {
                let (job, path) = (tracker.id, tracker.path.clone());
                tracker.errors.push(JobError {
                    job,
                    path,
                    part: None,
                    error: PostError::Interrupted,
                });
            }

            summary.jobs.push(tracker.report());
            if tracker.status == JobStatus::Success {
                summary.jobs_succeeded += 1;
            } else {
                summary.jobs_failed += 1;
            }
            summary.articles_posted += u64::from(tracker.posted);
            summary.articles_failed += u64::from(tracker.failed);
            summary.bytes_posted += tracker.bytes_posted;
            summary.errors.append(&mut tracker.errors);
        }

        info!(
            "Posted {} articles ({} bytes) in {:.1?}: {}/{} jobs succeeded, {} articles failed",
            summary.articles_posted,
            summary.bytes_posted,
            summary.elapsed,
            summary.jobs_succeeded,
            summary.jobs_total,
            summary.articles_failed
        );
        summary
    }
}
