use crate::types::{GreenscanError, GreenscanResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller raises to stop a running pipeline at the next checkpoint
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been raised
    pub fn check(&self, before: &str) -> GreenscanResult<()> {
        if self.is_cancelled() {
            log::warn!("Cancellation requested, stopping before {}", before);
            return Err(GreenscanError::Cancelled(before.to_string()));
        }
        Ok(())
    }
}
