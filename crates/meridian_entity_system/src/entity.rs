//! # Entities
//!
//! A hosted entity owns a mailbox, a monotonically increasing call-id
//! counter, its pending-call table, an explicit method dispatch table, and a
//! tree of replicated properties. Shadow entities are the same type with a
//! shadow-owned property tree: their replicated state is overwritten only by
//! inbound sync batches, never mutated locally.

use crate::args::ArgValue;
use crate::messages::{EntityRpcCall, EntityRpcResult, PropertySyncBatch};
use crate::rpc::{MethodTable, OutboundHook, PendingCallTable};
use crate::stats::{GatewayStats, ReplicationStats};
use crate::sync::property::{PropertyOwnership, PropertyTree, ReplicationPolicy};
use crate::sync::record::PropertyKind;
use crate::sync::SyncError;
use crate::types::{EntityId, EntityState, Mailbox};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// Lifecycle
// ============================================================================

/// Shared lifecycle flags of one entity.
///
/// Held by the entity and by its property tree, so the mutation guard can
/// observe freeze/destroy transitions without reaching back into the entity.
#[derive(Debug, Default)]
pub struct Lifecycle {
    frozen: AtomicBool,
    destroyed: AtomicBool,
}

impl Lifecycle {
    /// Current lifecycle state.
    pub fn state(&self) -> EntityState {
        if self.destroyed.load(Ordering::Acquire) {
            EntityState::Destroyed
        } else if self.frozen.load(Ordering::Acquire) {
            EntityState::Frozen
        } else {
            EntityState::Active
        }
    }

    /// True while the entity accepts calls and mutations.
    pub fn is_active(&self) -> bool {
        self.state() == EntityState::Active
    }

    fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn thaw(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

// ============================================================================
// Entity
// ============================================================================

/// A logical entity hosted by this process.
///
/// The entity's identity ([`EntityId`]) never changes; its [`Mailbox`]
/// location fields may change on migration via [`relocate`](Self::relocate).
pub struct Entity {
    id: EntityId,
    mailbox: RwLock<Mailbox>,
    lifecycle: Arc<Lifecycle>,
    next_call_id: AtomicU64,
    pub(crate) pending: Arc<PendingCallTable>,
    methods: MethodTable,
    properties: PropertyTree,
    subscribers: Mutex<BTreeSet<Mailbox>>,
    pub(crate) outbound: RwLock<Option<Arc<dyn OutboundHook>>>,
    pub(crate) stats: Arc<GatewayStats>,
    replication_stats: Arc<ReplicationStats>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .field("ownership", &self.properties.ownership())
            .field("pending_calls", &self.pending.len())
            .finish()
    }
}

impl Entity {
    /// Creates an authoritative entity living at `mailbox`.
    pub fn new(mailbox: Mailbox) -> Arc<Self> {
        Self::with_ownership(mailbox, PropertyOwnership::Authoritative)
    }

    /// Creates a shadow entity: a local read-only mirror of a remote
    /// authoritative entity's replicated properties.
    pub fn shadow(mailbox: Mailbox) -> Arc<Self> {
        Self::with_ownership(mailbox, PropertyOwnership::Shadow)
    }

    fn with_ownership(mailbox: Mailbox, ownership: PropertyOwnership) -> Arc<Self> {
        let id = mailbox.id.clone();
        let lifecycle = Arc::new(Lifecycle::default());
        let gateway_stats = Arc::new(GatewayStats::default());
        let replication_stats = Arc::new(ReplicationStats::default());
        Arc::new(Self {
            pending: Arc::new(PendingCallTable::new(id.clone(), Arc::clone(&gateway_stats))),
            properties: PropertyTree::new(
                ownership,
                Arc::clone(&lifecycle),
                Arc::clone(&replication_stats),
            ),
            id,
            mailbox: RwLock::new(mailbox),
            lifecycle,
            // Call ids start at 1; 0 is never allocated so it can stand in for
            // "no correlation" in logs.
            next_call_id: AtomicU64::new(1),
            methods: MethodTable::new(),
            subscribers: Mutex::new(BTreeSet::new()),
            outbound: RwLock::new(None),
            stats: gateway_stats,
            replication_stats,
        })
    }

    /// Stable identity of this entity.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Current mailbox (location fields may change across migrations).
    pub async fn mailbox(&self) -> Mailbox {
        self.mailbox.read().await.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EntityState {
        self.lifecycle.state()
    }

    /// The entity's method dispatch table.
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// The entity's replicated property tree.
    pub fn properties(&self) -> &PropertyTree {
        &self.properties
    }

    /// Gateway statistics for this entity.
    pub fn gateway_stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Replication statistics for this entity.
    pub fn replication_stats(&self) -> &ReplicationStats {
        &self.replication_stats
    }

    /// Number of calls currently awaiting a result.
    pub fn pending_call_count(&self) -> usize {
        self.pending.len()
    }

    /// Allocates the next call id. The counter never resets, so a call id is
    /// never reused within this entity's lifetime.
    pub(crate) fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Binds the outbound hook used to forward call messages. Done by the
    /// registry when the entity is registered.
    pub(crate) async fn bind_outbound(&self, hook: Arc<dyn OutboundHook>) {
        *self.outbound.write().await = Some(hook);
    }

    // ------------------------------------------------------------------
    // Lifecycle transitions
    // ------------------------------------------------------------------

    /// Freezes the entity for migration: property mutations are rejected
    /// until [`thaw`](Self::thaw).
    pub fn freeze(&self) {
        info!(entity = %self.id, "entity frozen for migration");
        self.lifecycle.freeze();
    }

    /// Reverses a freeze.
    pub fn thaw(&self) {
        info!(entity = %self.id, "entity thawed");
        self.lifecycle.thaw();
    }

    /// Destroys the entity. Every in-flight call is abandoned and all further
    /// inbound traffic for it is dropped.
    pub fn destroy(&self) {
        info!(entity = %self.id, "entity destroyed");
        self.lifecycle.destroy();
        self.pending.abandon_all();
    }

    /// Moves the entity to new physical coordinates, keeping its id.
    pub async fn relocate(&self, host: impl Into<String>, port: u16, host_num: u16) -> Mailbox {
        let mut mailbox = self.mailbox.write().await;
        *mailbox = mailbox.relocated(host, port, host_num);
        debug!(entity = %self.id, mailbox = %*mailbox, "entity relocated");
        mailbox.clone()
    }

    // ------------------------------------------------------------------
    // Property surface
    // ------------------------------------------------------------------

    /// Declares a replicated property on this entity.
    pub async fn declare_property(
        &self,
        path: impl Into<String>,
        kind: PropertyKind,
        policy: ReplicationPolicy,
        initial: ArgValue,
    ) -> Result<(), SyncError> {
        self.properties.declare(path, kind, policy, initial).await
    }

    /// Subscribes a remote shadow to this entity's replicated properties.
    pub async fn subscribe_shadow(&self, shadow: Mailbox) {
        self.subscribers.lock().await.insert(shadow);
    }

    /// Removes a shadow subscription.
    pub async fn unsubscribe_shadow(&self, shadow: &Mailbox) {
        self.subscribers.lock().await.remove(shadow);
    }

    /// Number of subscribed shadows.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Drains pending property mutations into per-subscriber sync batches.
    ///
    /// One batch is produced per (subscriber, property) pair that had pending
    /// records. With no subscribers the drained records are discarded; there
    /// is nobody to reproduce them for.
    pub async fn drain_sync_batches(&self) -> Vec<PropertySyncBatch> {
        let drained = self.properties.drain_replicated().await;
        if drained.is_empty() {
            return Vec::new();
        }
        let subscribers = self.subscribers.lock().await.clone();
        let mut batches = Vec::new();
        for (path, records) in drained {
            for target in &subscribers {
                batches.push(PropertySyncBatch {
                    target: target.clone(),
                    path: path.clone(),
                    records: records.clone(),
                });
                self.replication_stats
                    .batches_flushed
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        batches
    }

    /// Applies an inbound sync batch to this (shadow) entity.
    pub async fn apply_sync_batch(&self, batch: PropertySyncBatch) -> Result<(), SyncError> {
        self.properties.apply_sync(&batch.path, batch.records).await
    }

    // ------------------------------------------------------------------
    // Inbound RPC
    // ------------------------------------------------------------------

    /// Executes an inbound call against the method table.
    ///
    /// Returns the result message to route back to the caller, or `None` for
    /// notify-only calls and failed executions. A failed execution sends no
    /// reply; the caller's timeout is the failure signal, keeping the
    /// at-most-once contract.
    pub(crate) async fn handle_inbound_call(&self, call: EntityRpcCall) -> Option<EntityRpcResult> {
        if self.lifecycle.state() == EntityState::Destroyed {
            warn!(entity = %self.id, call_id = call.call_id, "call for destroyed entity dropped");
            return None;
        }
        let outcome = self.methods.invoke(&call.method, call.args).await;
        if call.notify_only {
            if let Err(err) = outcome {
                warn!(
                    entity = %self.id,
                    method = %call.method,
                    error = %err,
                    "notify execution failed"
                );
            }
            return None;
        }
        match outcome {
            Ok(payload) => Some(EntityRpcResult {
                call_id: call.call_id,
                target: call.source,
                payload,
            }),
            Err(err) => {
                warn!(
                    entity = %self.id,
                    method = %call.method,
                    call_id = call.call_id,
                    error = %err,
                    "call execution failed; no reply sent"
                );
                None
            }
        }
    }

    /// Resolves an inbound result against the pending-call table.
    pub fn on_result(&self, result: EntityRpcResult) {
        self.pending.resolve(result.call_id, result.payload);
    }
}
