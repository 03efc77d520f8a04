//! Cooperative cancellation for long training runs

use crate::error::{EnsembleError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop flag plus an optional deadline
///
/// Training checks the token between per-learner iterations. Clones share
/// the same flag, so any holder can stop a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Token that only stops when `cancel` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also stops at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Token that also stops after `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// `Err(Cancelled)` naming the stage that noticed the stop
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(EnsembleError::Cancelled(format!("stopped before {}", stage)));
        }
        Ok(())
    }
}
