//! # Statistics
//!
//! Lightweight counters for monitoring the RPC gateway, the replication
//! driver, and the delay scheduler. Counters are lock-free atomics updated on
//! the hot paths; `snapshot()` produces a plain serializable copy for health
//! reporting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the entity call gateway and pending-call table.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Calls sent with a pending record (call / call_as)
    pub calls_sent: AtomicU64,
    /// Notify-only sends, which never create pending records
    pub notifies_sent: AtomicU64,
    /// Pending calls resolved by a matching result
    pub calls_resolved: AtomicU64,
    /// Pending calls that hit their timeout
    pub calls_timed_out: AtomicU64,
    /// Results that arrived with no pending record and were dropped
    pub stale_results_dropped: AtomicU64,
}

impl GatewayStats {
    /// Copies the counters into a plain snapshot.
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            calls_sent: self.calls_sent.load(Ordering::Relaxed),
            notifies_sent: self.notifies_sent.load(Ordering::Relaxed),
            calls_resolved: self.calls_resolved.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            stale_results_dropped: self.stale_results_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStatsSnapshot {
    pub calls_sent: u64,
    pub notifies_sent: u64,
    pub calls_resolved: u64,
    pub calls_timed_out: u64,
    pub stale_results_dropped: u64,
}

/// Counters for the property replication driver.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    /// Mutation records accepted into operation logs
    pub ops_recorded: AtomicU64,
    /// Records folded into an already-queued record instead of appended
    pub ops_coalesced: AtomicU64,
    /// Sync batches handed to the scheduler
    pub batches_flushed: AtomicU64,
    /// Mutations rejected by the frozen/shadow guard
    pub mutations_rejected: AtomicU64,
}

impl ReplicationStats {
    /// Copies the counters into a plain snapshot.
    pub fn snapshot(&self) -> ReplicationStatsSnapshot {
        ReplicationStatsSnapshot {
            ops_recorded: self.ops_recorded.load(Ordering::Relaxed),
            ops_coalesced: self.ops_coalesced.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            mutations_rejected: self.mutations_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReplicationStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatsSnapshot {
    pub ops_recorded: u64,
    pub ops_coalesced: u64,
    pub batches_flushed: u64,
    pub mutations_rejected: u64,
}

/// Counters for the delay scheduler.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Entries accepted into the wheel
    pub entries_scheduled: AtomicU64,
    /// Entries drained and handed to the transport
    pub entries_delivered: AtomicU64,
    /// Entries whose transport send failed and was reported
    pub send_errors: AtomicU64,
}

impl SchedulerStats {
    /// Copies the counters into a plain snapshot.
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            entries_scheduled: self.entries_scheduled.load(Ordering::Relaxed),
            entries_delivered: self.entries_delivered.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatsSnapshot {
    pub entries_scheduled: u64,
    pub entries_delivered: u64,
    pub send_errors: u64,
}
