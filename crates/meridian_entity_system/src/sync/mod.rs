//! # Property Replication
//!
//! Everything between "a replicated field was mutated" and "a minimal batch of
//! sync commands left for the wire":
//!
//! - [`record`] - sync operation records and their wire rendering
//! - [`log`] - the per-property operation log with coalescing merge rules
//! - [`property`] - the replication driver wrapping replicated fields, the
//!   mutation guard, and shadow-side application
//!
//! The engine is eventually consistent: batches are pushed best-effort toward
//! subscribed shadows, and a shadow that starts from the last acknowledged
//! state and applies a flushed batch in order ends up mirroring the owner.

pub mod log;
pub mod property;
pub mod record;


pub use log::{RecordOutcome, SyncOpLog};
pub use property::{PropertyOwnership, PropertyTree, ReplicatedProperty, ReplicationPolicy};
pub use record::{PropertyKind, SyncKey, SyncOp, SyncOpKind};

use crate::types::EntityState;

/// Errors raised by the replication driver.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A local mutation was attempted on a shadow-owned replica
    #[error("property {path} is a shadow replica; local mutation is not allowed")]
    ShadowMutation {
        /// Path of the property that rejected the mutation
        path: String,
    },
    /// A mutation was attempted while the owning entity was frozen or destroyed
    #[error("entity is {state}; mutation of {path} rejected")]
    EntityInactive {
        /// Path of the property that rejected the mutation
        path: String,
        /// Lifecycle state that caused the rejection
        state: EntityState,
    },
    /// No property is declared at the given path
    #[error("unknown property path: {0}")]
    UnknownProperty(String),
    /// A property path was declared twice
    #[error("property path already declared: {0}")]
    DuplicateProperty(String),
    /// The operation does not apply to the property's kind
    #[error("operation {op} does not apply to {kind:?} property {path}")]
    KindMismatch {
        /// Path of the property
        path: String,
        /// Declared kind of the property
        kind: PropertyKind,
        /// Name of the rejected operation
        op: &'static str,
    },
    /// An operand was out of range for the current value
    #[error("bad operand for property {path}: {detail}")]
    BadOperand {
        /// Path of the property
        path: String,
        /// What was wrong with the operand
        detail: String,
    },
    /// A sync batch was applied to a tree that is not a shadow replica
    #[error("sync batch for {0} applied to an authoritative property tree")]
    NotAShadow(String),
}
