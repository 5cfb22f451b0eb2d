//! # Utility Functions
//!
//! Convenience helpers shared across the entity system.

use crate::registry::EntityRegistry;
use std::sync::Arc;

/// Creates an entity host (registry) with the default configuration.
///
/// This is the primary factory function for embedding the entity system in a
/// hosting process. Bind a transport and spawn the pumps afterwards:
///
/// ```rust,no_run
/// use meridian_entity_system::create_entity_host;
///
/// let registry = create_entity_host();
/// let dispatcher = registry.dispatcher();
/// // hand `dispatcher` to the transport, then registry.bind_transport(...)
/// ```
pub fn create_entity_host() -> Arc<EntityRegistry> {
    EntityRegistry::with_defaults()
}
