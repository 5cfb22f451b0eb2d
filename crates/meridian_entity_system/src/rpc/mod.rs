//! # Mailbox-Addressed RPC
//!
//! The remote-call subsystem: call correlation, timeout, notify-only calls,
//! and the method dispatch table entities expose to inbound calls.
//!
//! - [`pending`] - the per-entity pending-call table
//! - [`gateway`] - `send`/`call`/`call_as`/`notify`/`on_result` on [`Entity`](crate::entity::Entity)
//!
//! RPC semantics are at-most-once: nothing in here retries transparently, and
//! a call that outlives its deadline fails with [`RpcError::Timeout`] while a
//! late reply is silently dropped.

pub mod gateway;
pub mod pending;

#[cfg(test)]
mod tests;

pub use gateway::OutboundHook;
pub use pending::{CallOutcome, PendingCallTable};

use crate::args::{ArgDecodeError, ArgValue};
use crate::transport::TransportError;
use crate::types::EntityId;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Errors surfaced by the call gateway and method dispatch.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The pending call's timer fired before a matching result arrived
    #[error("rpc call {call_id} on entity {entity} timed out after {timeout_ms} ms")]
    Timeout {
        /// Entity that issued the call
        entity: EntityId,
        /// Correlation id of the call
        call_id: u64,
        /// Deadline that expired
        timeout_ms: u64,
    },
    /// A typed call received a payload that cannot be decoded as the requested type
    #[error("rpc result for call {call_id} could not be decoded: {source}")]
    TypeMismatch {
        /// Correlation id of the call
        call_id: u64,
        /// Underlying decode failure
        #[source]
        source: ArgDecodeError,
    },
    /// The target entity has no method registered under this name
    #[error("no method named {0} registered on target entity")]
    UnknownMethod(String),
    /// The target mailbox could not be resolved to any known connection
    #[error("routing failure: {0}")]
    Routing(#[from] TransportError),
    /// The pending record disappeared without resolution (entity destroyed)
    #[error("pending call {call_id} abandoned before resolution")]
    Abandoned {
        /// Correlation id of the call
        call_id: u64,
    },
    /// The invoked method itself failed
    #[error("method execution failed: {0}")]
    Execution(String),
    /// An inbound argument could not be decoded by the method handler
    #[error("argument decode failed: {0}")]
    BadArgument(#[from] ArgDecodeError),
}

/// Boxed future returned by a registered method handler.
pub type MethodFuture = BoxFuture<'static, Result<ArgValue, RpcError>>;

/// A registered method handler: argument list in, encoded result out.
pub type MethodHandler = Arc<dyn Fn(Vec<ArgValue>) -> MethodFuture + Send + Sync>;

/// Per-entity dispatch table keyed by a stable method-name string.
///
/// Handlers are explicit registrations, not reflection: an entity type wires
/// up its callable surface once at construction and inbound calls resolve
/// through a plain map lookup.
#[derive(Default)]
pub struct MethodTable {
    handlers: DashMap<String, MethodHandler>,
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.handlers.len())
            .finish()
    }
}

impl MethodTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous registration.
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(Vec<ArgValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ArgValue, RpcError>> + Send + 'static,
    {
        self.handlers
            .insert(name.to_string(), Arc::new(move |args| Box::pin(handler(args))));
    }

    /// True if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes the handler registered under `method`.
    pub async fn invoke(&self, method: &str, args: Vec<ArgValue>) -> Result<ArgValue, RpcError> {
        let handler = self
            .handlers
            .get(method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
        handler(args).await
    }
}
