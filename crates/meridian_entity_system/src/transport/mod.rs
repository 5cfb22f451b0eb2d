//! # Transport Boundary
//!
//! The core does not implement a byte-level transport; it depends on one
//! through the [`Transport`] trait and feeds inbound traffic through an
//! [`InboundDispatcher`]. A transport implementation is expected to be
//! best-effort and ordered per connection; everything stronger (correlation,
//! timeout, coalescing) lives above this seam.
//!
//! - [`loopback`] - an in-memory transport connecting dispatchers within one
//!   process, used by tests and single-process topologies

pub mod loopback;

use crate::messages::{EntityRpcCall, EntityRpcResult, PropertySyncBatch, WireMessage};
use crate::types::Mailbox;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Errors raised at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target mailbox does not resolve to any known connection
    #[error("no route to {0}")]
    NoRoute(Mailbox),
    /// The connection toward the target went away mid-send
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    /// A frame could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// No transport has been bound to the registry yet
    #[error("no transport bound")]
    NotBound,
}

/// Outbound half of the transport contract.
///
/// `send` is best-effort: delivery guarantees are whatever the underlying
/// stream provides, and a returned error means the message certainly did not
/// leave this process.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serializes and sends `message` toward the connection associated with
    /// `target`'s owner.
    async fn send(&self, target: &Mailbox, message: WireMessage) -> Result<(), TransportError>;
}

/// Inbound half of the transport contract: the handlers a host registers for
/// the three message kinds the core consumes.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// An entity RPC call (or notify) arrived for a locally hosted entity.
    async fn on_inbound_call(&self, call: EntityRpcCall);
    /// An entity RPC result arrived for a locally issued call.
    async fn on_inbound_result(&self, result: EntityRpcResult);
    /// A property sync batch arrived for a locally hosted shadow entity.
    async fn on_inbound_sync_batch(&self, batch: PropertySyncBatch);
}

/// Routes decoded inbound messages to the registered [`InboundHandler`].
///
/// A transport implementation calls [`dispatch`](Self::dispatch) once per
/// decoded frame (or [`dispatch_frame`](Self::dispatch_frame) with the raw
/// bytes); the message tag selects the handler entry point.
pub struct InboundDispatcher {
    handler: Arc<dyn InboundHandler>,
}

impl std::fmt::Debug for InboundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDispatcher").finish()
    }
}

impl InboundDispatcher {
    /// Creates a dispatcher feeding `handler`.
    pub fn new(handler: Arc<dyn InboundHandler>) -> Arc<Self> {
        Arc::new(Self { handler })
    }

    /// Dispatches one decoded message by kind.
    pub async fn dispatch(&self, message: WireMessage) {
        trace!(
            kind = message.kind_name(),
            target = %message.target(),
            correlation_id = ?message.correlation_id(),
            "dispatching inbound message"
        );
        match message {
            WireMessage::RpcCall(call) => self.handler.on_inbound_call(call).await,
            WireMessage::RpcResult(result) => self.handler.on_inbound_result(result).await,
            WireMessage::SyncBatch(batch) => self.handler.on_inbound_sync_batch(batch).await,
        }
    }

    /// Decodes a serialized frame and dispatches it.
    pub async fn dispatch_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let message: WireMessage = serde_json::from_slice(frame)?;
        self.dispatch(message).await;
        Ok(())
    }
}
