//! # Meridian Entity System
//!
//! A distributed entity framework for multiplayer server backends. Logical
//! entities (game objects, players, cells) live on one process among many and
//! are addressed by a location-independent [`Mailbox`]; other processes invoke
//! methods on an entity without knowing its physical location, and state
//! fields marked replicated propagate automatically to subscribing remote
//! shadows.
//!
//! ## Core Components
//!
//! - **Mailbox-addressed RPC** ([`rpc`], [`entity`]): call correlation with
//!   per-call timeouts, notify-only calls, typed replies, and local-vs-remote
//!   dispatch through the [`registry`]
//! - **Property replication** ([`sync`]): mutation interception, per-property
//!   operation logs coalesced to the minimal equivalent sequence, and
//!   shadow-side application
//! - **Delay scheduler** ([`scheduler`]): a bucketed time wheel batching
//!   outbound sync traffic, decoupling mutation from transmission
//! - **Transport seam** ([`transport`]): the boundary contract a byte-level
//!   transport must satisfy, plus an in-memory loopback implementation
//!
//! ## Semantics
//!
//! RPC is at-most-once: no hidden retries, a fixed (but per-call
//! configurable) timeout, and late replies dropped idempotently. Property
//! replication is eventually consistent: a shadow that applies flushed
//! batches in order converges on the owner's state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meridian_entity_system::{
//!     args, create_entity_host, ArgValue, Entity, EntityId, Mailbox,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = create_entity_host();
//!
//!     let mailbox = Mailbox::new("127.0.0.1", 7100, 0, EntityId::new("greeter"));
//!     let entity = Entity::new(mailbox.clone());
//!     entity.methods().register("Hello", |args| async move {
//!         let name: String = args
//!             .into_iter()
//!             .next()
//!             .ok_or_else(|| meridian_entity_system::RpcError::Execution("missing arg".into()))?
//!             .decode()
//!             .map_err(meridian_entity_system::RpcError::BadArgument)?;
//!         Ok(ArgValue::Str(format!("hello, {name}")))
//!     });
//!     registry.register_local_entity(Arc::clone(&entity)).await;
//!
//!     // A second local entity can now call the first in-process.
//!     let caller = Entity::new(Mailbox::new("127.0.0.1", 7100, 0, EntityId::new("caller")));
//!     registry.register_local_entity(Arc::clone(&caller)).await;
//!     let reply: String = caller.call_as(mailbox, "Hello", args!["world"]).await?;
//!     assert_eq!(reply, "hello, world");
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod config;
pub mod entity;
pub mod messages;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod sync;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_integration;

pub use args::{ArgDecodeError, ArgValue, FromArg, IntoArg};
pub use config::{
    CallConfig, ConfigValidationError, MeridianConfig, ReplicationConfig, SchedulerConfig,
    DEFAULT_CALL_TIMEOUT,
};
pub use entity::{Entity, Lifecycle};
pub use messages::{EntityRpcCall, EntityRpcResult, PropertySyncBatch, WireMessage};
pub use registry::EntityRegistry;
pub use rpc::{CallOutcome, MethodTable, OutboundHook, PendingCallTable, RpcError};
pub use scheduler::{DelayScheduler, ScheduledEntry, SchedulerError};
pub use shutdown::ShutdownState;
pub use stats::{
    GatewayStats, GatewayStatsSnapshot, ReplicationStats, ReplicationStatsSnapshot,
    SchedulerStats, SchedulerStatsSnapshot,
};
pub use sync::{
    PropertyKind, PropertyOwnership, PropertyTree, RecordOutcome, ReplicatedProperty,
    ReplicationPolicy, SyncError, SyncKey, SyncOp, SyncOpKind, SyncOpLog,
};
pub use transport::{
    loopback::{LoopbackNetwork, LoopbackTransport},
    InboundDispatcher, InboundHandler, Transport, TransportError,
};
pub use types::{EntityId, EntityState, Mailbox};
pub use utils::create_entity_host;
