//! Shutdown coordination for graceful host teardown.
//!
//! Shared flags the periodic pumps (replication flush, scheduler tick) check
//! so in-flight work drains before the host exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across pumps.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    initiated: Arc<AtomicBool>,
    complete: Arc<AtomicBool>,
}

impl ShutdownState {
    /// Creates a new shutdown state with both flags unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once shutdown has been requested; pumps stop after their current
    /// iteration.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    /// True once the pumps have drained and final cleanup may begin.
    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Requests shutdown.
    pub fn initiate_shutdown(&self) {
        info!("shutdown initiated");
        self.initiated.store(true, Ordering::Release);
    }

    /// Marks the drain as finished.
    pub fn mark_shutdown_complete(&self) {
        info!("shutdown complete");
        self.complete.store(true, Ordering::Release);
    }
}
