//! Shared FIFO of articles waiting to be posted
//!
//! Tickets are popped in insertion order. A ticket put back after a
//! retryable failure carries a `not_before` instant and stays invisible until
//! it is due. The queue ends when every ticket has reached a terminal state,
//! when it is closed, or when the run is cancelled.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// One article's place in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    /// Index of the job in the run's job list
    pub job: usize,
    /// Index of the article within its job
    pub article: usize,
    /// Failed attempts so far
    pub attempts: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Ticket>,
    delayed: Vec<(Instant, Ticket)>,
    /// Tickets not yet terminal: queued, delayed or held by a worker
    outstanding: usize,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        if self.delayed.is_empty() {
            return;
        }
        self.delayed.sort_by_key(|(due, _)| *due);
        let due = self.delayed.partition_point(|(at, _)| *at <= now);
        self.ready
            .extend(self.delayed.drain(..due).map(|(_, ticket)| ticket));
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(due, _)| *due).min()
    }
}

#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    /// Queue seeded with `tickets`, all outstanding
    pub fn new(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let ready: VecDeque<Ticket> = tickets.into_iter().collect();
        Self {
            state: Mutex::new(QueueState {
                outstanding: ready.len(),
                ready,
                ..Default::default()
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the next due ticket
    ///
    /// Waits while tickets are delayed or held by other workers. Returns
    /// `None` once nothing is outstanding, the queue is closed, or `cancel`
    /// fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<Ticket> {
        loop {
            // Register interest before looking, so a wake-up between the
            // check and the wait is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed || state.outstanding == 0 || cancel.is_cancelled() {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(ticket) = state.ready.pop_front() {
                    return Some(ticket);
                }
                state.next_due()
            };

            let delay = async {
                match wake_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = notified => {}
                _ = delay => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Put a ticket back, visible after `delay`
    ///
    /// Returns the ticket when the queue is closed; the caller must then
    /// settle it.
    pub fn requeue(&self, ticket: Ticket, delay: Duration) -> Result<(), Ticket> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(ticket);
            }
            if delay.is_zero() {
                state.ready.push_back(ticket);
            } else {
                state.delayed.push((Instant::now() + delay, ticket));
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Mark one held ticket terminal
    pub fn complete(&self) {
        let finished = {
            let mut state = self.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            state.outstanding == 0
        };
        if finished {
            self.notify.notify_waiters();
        }
    }

    /// Stop handing out tickets and return everything still queued
    ///
    /// Returned tickets are no longer outstanding. Tickets held by workers
    /// stay outstanding until they are completed.
    pub fn close(&self) -> Vec<Ticket> {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            let mut drained: Vec<Ticket> = state.ready.drain(..).collect();
            drained.extend(state.delayed.drain(..).map(|(_, ticket)| ticket));
            state.outstanding = state.outstanding.saturating_sub(drained.len());
            drained
        };
        self.notify.notify_waiters();
        drained
    }

    /// Number of tickets not yet terminal
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }
}
