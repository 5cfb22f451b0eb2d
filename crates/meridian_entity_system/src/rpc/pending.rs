//! Pending-call table: per-entity map from call id to the resolver that
//! completes the caller's handle, with timeout cancellation.
//!
//! The table is shared between three access points running concurrently: the
//! calling path inserts, the dispatch path resolves, and the timer path
//! expires. All removal goes through `DashMap::remove`, which is an atomic
//! remove-if-present, so a record is resolved exactly once no matter which
//! path wins the race.

use super::RpcError;
use crate::args::ArgValue;
use crate::stats::GatewayStats;
use crate::types::EntityId;
use dashmap::DashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// What a pending call eventually resolves to.
pub type CallOutcome = Result<ArgValue, RpcError>;

struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    timeout: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("timer_armed", &self.timeout.is_some())
            .finish()
    }
}

/// Map of in-flight calls for one entity.
#[derive(Debug)]
pub struct PendingCallTable {
    owner: EntityId,
    entries: DashMap<u64, PendingCall>,
    stats: Arc<GatewayStats>,
}

impl PendingCallTable {
    /// Creates an empty table for the entity identified by `owner`.
    pub fn new(owner: EntityId, stats: Arc<GatewayStats>) -> Self {
        Self {
            owner,
            entries: DashMap::new(),
            stats,
        }
    }

    /// Registers a pending record for `call_id` and arms its timeout.
    ///
    /// Returns the receiver half of the caller's handle. When the timer fires
    /// first, the record is removed and the handle completes with
    /// [`RpcError::Timeout`]; a result arriving afterwards finds no record and
    /// is dropped. Resolution before the deadline aborts the timer, and a
    /// timer that outraces the abort simply finds the record already gone.
    pub fn register(
        self: &Arc<Self>,
        call_id: u64,
        timeout: Duration,
    ) -> oneshot::Receiver<CallOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.entries.insert(
            call_id,
            PendingCall {
                sender,
                timeout: None,
            },
        );

        let table = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, pending)) = table.entries.remove(&call_id) {
                table.stats.calls_timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = pending.sender.send(Err(RpcError::Timeout {
                    entity: table.owner.clone(),
                    call_id,
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        });

        // The record may already be resolved by the time we store the timer
        // handle; the orphaned timer then no-ops when it fires.
        if let Some(mut entry) = self.entries.get_mut(&call_id) {
            entry.timeout = Some(timer);
        }
        receiver
    }

    /// Resolves `call_id` with `payload`.
    ///
    /// Returns false when no record exists, i.e. the call already timed out or
    /// this is a duplicate result. That case is intentional idempotent
    /// behavior, not an error.
    pub fn resolve(&self, call_id: u64, payload: ArgValue) -> bool {
        match self.entries.remove(&call_id) {
            Some((_, pending)) => {
                if let Some(timer) = pending.timeout {
                    timer.abort();
                }
                self.stats.calls_resolved.fetch_add(1, Ordering::Relaxed);
                let _ = pending.sender.send(Ok(payload));
                true
            }
            None => {
                self.stats
                    .stale_results_dropped
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    entity = %self.owner,
                    call_id,
                    "stale or duplicate rpc result dropped"
                );
                false
            }
        }
    }

    /// Removes a record without resolving it, used when the send itself failed
    /// and the caller is about to see the send error instead.
    pub fn discard(&self, call_id: u64) {
        if let Some((_, pending)) = self.entries.remove(&call_id) {
            if let Some(timer) = pending.timeout {
                timer.abort();
            }
        }
    }

    /// Drops every pending record; outstanding handles complete with
    /// [`RpcError::Abandoned`]. Called when the owning entity is destroyed.
    pub fn abandon_all(&self) {
        let call_ids: Vec<u64> = self.entries.iter().map(|entry| *entry.key()).collect();
        for call_id in call_ids {
            if let Some((_, pending)) = self.entries.remove(&call_id) {
                if let Some(timer) = pending.timeout {
                    timer.abort();
                }
                let _ = pending.sender.send(Err(RpcError::Abandoned { call_id }));
            }
        }
    }

    /// Number of in-flight calls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
