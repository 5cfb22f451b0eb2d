//! # Entity Registry
//!
//! The hosting process's view of its local entities: registration keyed by
//! mailbox, the local-vs-remote routing decision, inbound dispatch for the
//! three wire message kinds, and the periodic pumps (replication flush and
//! scheduler tick).
//!
//! Routing rule: a target mailbox whose four fields match a registered local
//! entity is dispatched in-process with no serialization round trip; any other
//! target is forwarded to the bound transport toward its logical owner.

use crate::config::{ConfigValidationError, MeridianConfig};
use crate::entity::Entity;
use crate::messages::{EntityRpcCall, EntityRpcResult, PropertySyncBatch, WireMessage};
use crate::rpc::{OutboundHook, RpcError};
use crate::scheduler::{DelayScheduler, SchedulerError};
use crate::shutdown::ShutdownState;
use crate::transport::{InboundDispatcher, InboundHandler, Transport, TransportError};
use crate::types::Mailbox;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry of locally hosted entities plus the routing/dispatch glue around
/// them.
pub struct EntityRegistry {
    config: MeridianConfig,
    entities: DashMap<Mailbox, Arc<Entity>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    scheduler: Arc<DelayScheduler>,
    shutdown: ShutdownState,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entities.len())
            .field("shutdown_initiated", &self.shutdown.is_shutdown_initiated())
            .finish()
    }
}

impl EntityRegistry {
    /// Creates a registry after validating `config`.
    pub fn new(config: MeridianConfig) -> Result<Arc<Self>, ConfigValidationError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Creates a registry with the default configuration.
    pub fn with_defaults() -> Arc<Self> {
        Self::build(MeridianConfig::default())
    }

    fn build(config: MeridianConfig) -> Arc<Self> {
        let scheduler = DelayScheduler::new(config.scheduler.clone());
        Arc::new(Self {
            config,
            entities: DashMap::new(),
            transport: RwLock::new(None),
            scheduler,
            shutdown: ShutdownState::new(),
        })
    }

    /// The registry's configuration.
    pub fn config(&self) -> &MeridianConfig {
        &self.config
    }

    /// The delay scheduler batching this host's outbound sync traffic.
    pub fn scheduler(&self) -> &Arc<DelayScheduler> {
        &self.scheduler
    }

    /// Shutdown flags shared with the pumps.
    pub fn shutdown(&self) -> &ShutdownState {
        &self.shutdown
    }

    /// Binds the transport used for every non-local destination.
    pub async fn bind_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
    }

    /// Builds the inbound dispatcher a transport must feed with decoded
    /// frames.
    pub fn dispatcher(self: &Arc<Self>) -> Arc<InboundDispatcher> {
        InboundDispatcher::new(Arc::clone(self) as Arc<dyn InboundHandler>)
    }

    /// Registers a local entity under its current mailbox and wires its
    /// outbound hook through this registry.
    pub async fn register_local_entity(self: &Arc<Self>, entity: Arc<Entity>) -> Mailbox {
        let mailbox = entity.mailbox().await;
        entity
            .bind_outbound(Arc::clone(self) as Arc<dyn OutboundHook>)
            .await;
        info!(entity = %entity.id(), mailbox = %mailbox, "local entity registered");
        self.entities.insert(mailbox.clone(), entity);
        mailbox
    }

    /// Removes a local entity. The entity itself is untouched; callers
    /// typically follow up with [`Entity::destroy`].
    pub fn unregister(&self, mailbox: &Mailbox) -> Option<Arc<Entity>> {
        self.entities.remove(mailbox).map(|(_, entity)| {
            info!(entity = %entity.id(), %mailbox, "local entity unregistered");
            entity
        })
    }

    /// Looks up a local entity by exact mailbox match.
    pub fn lookup(&self, mailbox: &Mailbox) -> Option<Arc<Entity>> {
        self.entities
            .get(mailbox)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered local entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Relocates a registered entity to new physical coordinates, re-keying
    /// the registry. Returns the new mailbox, or `None` when `current` is not
    /// registered here.
    pub async fn relocate_local_entity(
        &self,
        current: &Mailbox,
        host: impl Into<String>,
        port: u16,
        host_num: u16,
    ) -> Option<Mailbox> {
        let (_, entity) = self.entities.remove(current)?;
        let relocated = entity.relocate(host, port, host_num).await;
        self.entities.insert(relocated.clone(), entity);
        Some(relocated)
    }

    /// Drains every registered entity's pending property mutations into the
    /// delay scheduler.
    pub async fn flush_replication(&self) {
        let entities: Vec<Arc<Entity>> = self
            .entities
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let delay = self.config.replication.flush_delay();
        let keep_order = self.config.replication.keep_order;
        for entity in entities {
            for batch in entity.drain_sync_batches().await {
                self.scheduler.schedule(batch, delay, keep_order).await;
            }
        }
    }

    /// Spawns the replication flush pump and the scheduler tick pump.
    ///
    /// Requires a bound transport. Returns the task handles plus the receiver
    /// carrying per-entry flush failures (the process-level error channel).
    pub async fn spawn_pumps(
        self: &Arc<Self>,
    ) -> Result<(Vec<JoinHandle<()>>, mpsc::UnboundedReceiver<SchedulerError>), TransportError>
    {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotBound)?;
        let (error_sender, error_receiver) = mpsc::unbounded_channel();

        let scheduler_pump =
            self.scheduler
                .spawn_pump(transport, error_sender, self.shutdown.clone());

        let registry = Arc::clone(self);
        let flush_pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.config.replication.flush_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if registry.shutdown.is_shutdown_initiated() {
                    debug!("replication flush pump stopping");
                    break;
                }
                registry.flush_replication().await;
            }
        });

        Ok((vec![scheduler_pump, flush_pump], error_receiver))
    }

    /// Routes a result message to its caller: locally when the caller is
    /// hosted here, over the transport otherwise. A reply that cannot be
    /// delivered is dropped; the caller's timeout is the backstop.
    async fn deliver_result(&self, result: EntityRpcResult) {
        if let Some(entity) = self.lookup(&result.target) {
            entity.on_result(result);
            return;
        }
        let transport = self.transport.read().await.clone();
        match transport {
            Some(transport) => {
                let target = result.target.clone();
                if let Err(err) = transport.send(&target, WireMessage::RpcResult(result)).await {
                    warn!(%target, error = %err, "rpc result could not be delivered");
                }
            }
            None => warn!(target = %result.target, "rpc result dropped; no transport bound"),
        }
    }
}

#[async_trait]
impl OutboundHook for EntityRegistry {
    async fn forward_call(&self, call: EntityRpcCall) -> Result<(), RpcError> {
        if let Some(entity) = self.lookup(&call.target) {
            // Full four-field mailbox match: in-process dispatch, no
            // serialization round trip, no transport involvement.
            if let Some(result) = entity.handle_inbound_call(call).await {
                self.deliver_result(result).await;
            }
            return Ok(());
        }
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotBound)?;
        let target = call.target.clone();
        transport
            .send(&target, WireMessage::RpcCall(call))
            .await
            .map_err(RpcError::from)
    }
}

#[async_trait]
impl InboundHandler for EntityRegistry {
    async fn on_inbound_call(&self, call: EntityRpcCall) {
        match self.lookup(&call.target) {
            Some(entity) => {
                if let Some(result) = entity.handle_inbound_call(call).await {
                    self.deliver_result(result).await;
                }
            }
            None => warn!(
                target = %call.target,
                method = %call.method,
                "inbound call for unknown entity dropped"
            ),
        }
    }

    async fn on_inbound_result(&self, result: EntityRpcResult) {
        match self.lookup(&result.target) {
            Some(entity) => entity.on_result(result),
            None => debug!(
                target = %result.target,
                call_id = result.call_id,
                "inbound result for unknown entity dropped"
            ),
        }
    }

    async fn on_inbound_sync_batch(&self, batch: PropertySyncBatch) {
        match self.lookup(&batch.target) {
            Some(entity) => {
                if let Err(err) = entity.apply_sync_batch(batch).await {
                    warn!(error = %err, "inbound sync batch rejected");
                }
            }
            None => warn!(
                target = %batch.target,
                path = %batch.path,
                "inbound sync batch for unknown shadow dropped"
            ),
        }
    }
}
