//! Per-server health tracking
//!
//! A server is alive until it fails fatally once (authentication, TLS,
//! posting refused) or fails to open a session `max_attempts` times in a row.
//! Death is permanent for the run.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tracing::warn;

use crate::aggregate::ServerReport;

#[derive(Debug)]
pub(crate) struct ServerHealth {
    name: String,
    address: String,
    dead: AtomicBool,
    consecutive_failures: AtomicU32,
    posted: AtomicU64,
    bytes_posted: AtomicU64,
    failed_attempts: AtomicU64,
    reason: Mutex<Option<String>>,
}

impl ServerHealth {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            dead: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            posted: AtomicU64::new(0),
            bytes_posted: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            reason: Mutex::new(None),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Declare the server unusable
    ///
    /// Returns `true` only for the call that actually killed it.
    pub fn kill(&self, reason: impl Into<String>) -> bool {
        if self.dead.swap(true, Ordering::AcqRel) {
            return false;
        }
        let reason = reason.into();
        warn!(server = %self.name, "Disabling server {}: {}", self.address, reason);
        *self.reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
        true
    }

    /// Count a failed session open; returns the consecutive failure count
    pub fn record_connect_failure(&self) -> u32 {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_connect_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn record_posted(&self, bytes: u64) {
        self.posted.fetch_add(1, Ordering::Relaxed);
        self.bytes_posted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_post_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> ServerReport {
        ServerReport {
            name: self.name.clone(),
            address: self.address.clone(),
            articles_posted: self.posted.load(Ordering::Relaxed),
            bytes_posted: self.bytes_posted.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            disabled: self
                .reason
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}
