//! # Core Type Definitions
//!
//! Fundamental value types used throughout the Meridian entity system:
//! location-transparent entity addresses and entity identity/lifecycle types.
//!
//! ## Key Types
//!
//! - [`Mailbox`] - Location-transparent address of an entity
//! - [`EntityId`] - Stable identity of an entity, unchanged across migration
//! - [`EntityState`] - Lifecycle state of a hosted entity
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent id confusion across subsystems
//! - **Serialization**: All types support JSON serialization for network transmission
//! - **Value Semantics**: A mailbox is immutable once constructed and compares by
//!   all four of its fields, making it usable as a routing key

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Entity Identity
// ============================================================================

/// Stable identity of an entity.
///
/// The id never changes for the lifetime of an entity, even when the entity
/// migrates between processes and its [`Mailbox`] location fields change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Creates an entity id from an explicit string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a new random entity id using UUID v4.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Mailbox
// ============================================================================

/// Location-transparent address of an entity.
///
/// A mailbox identifies both *where* an entity currently lives (`host`, `port`,
/// `host_num`) and *which* entity it is (`id`). Two mailboxes are equal if and
/// only if all four fields match, which makes the type directly usable as a
/// registry/routing key.
///
/// Mailboxes are plain values: cloning one is cheap enough for routing purposes
/// and there is no behavior beyond equality, hashing and serialization.
///
/// # Examples
///
/// ```rust
/// use meridian_entity_system::types::{EntityId, Mailbox};
///
/// let a = Mailbox::new("10.0.0.1", 7100, 0, EntityId::new("A"));
/// let b = Mailbox::new("10.0.0.1", 7100, 0, EntityId::new("A"));
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mailbox {
    /// Host address of the process currently owning the entity
    pub host: String,
    /// Listening port of the owning process
    pub port: u16,
    /// Logical host number, distinguishing co-located processes
    pub host_num: u16,
    /// Stable entity identity
    pub id: EntityId,
}

impl Mailbox {
    /// Creates a new mailbox value.
    pub fn new(host: impl Into<String>, port: u16, host_num: u16, id: EntityId) -> Self {
        Self {
            host: host.into(),
            port,
            host_num,
            id,
        }
    }

    /// Returns a copy of this mailbox relocated to new physical coordinates.
    ///
    /// The entity id is preserved; only the location fields change. This is the
    /// migration primitive: an entity never changes identity, only residence.
    pub fn relocated(&self, host: impl Into<String>, port: u16, host_num: u16) -> Self {
        Self {
            host: host.into(),
            port,
            host_num,
            id: self.id.clone(),
        }
    }

    /// Returns true if `other` lives at the same physical endpoint (ignoring id).
    pub fn same_endpoint(&self, other: &Mailbox) -> bool {
        self.host == other.host && self.port == other.port && self.host_num == other.host_num
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}#{}/{}",
            self.host, self.port, self.host_num, self.id
        )
    }
}

// ============================================================================
// Entity Lifecycle
// ============================================================================

/// Lifecycle state of a hosted entity.
///
/// Entities are created `Active`, may be temporarily `Frozen` while a migration
/// is in flight (new property mutations are rejected during this window), and
/// end up `Destroyed` once torn down or migrated away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Entity accepts calls and property mutations
    Active,
    /// Mid-migration: property mutations are rejected until thawed
    Frozen,
    /// Entity has been torn down; all pending calls were abandoned
    Destroyed,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityState::Active => write!(f, "active"),
            EntityState::Frozen => write!(f, "frozen"),
            EntityState::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct() {
        assert_ne!(EntityId::random(), EntityId::random());
    }

    #[test]
    fn relocation_preserves_identity_but_not_equality() {
        let before = Mailbox::new("10.0.0.1", 7100, 0, EntityId::new("A"));
        let after = before.relocated("10.0.0.2", 7200, 1);
        assert_eq!(before.id, after.id);
        assert_ne!(before, after);
        assert!(!before.same_endpoint(&after));
    }
}
