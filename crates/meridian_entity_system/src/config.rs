//! # Configuration
//!
//! Configuration structures for the entity system: RPC call defaults,
//! replication flushing, and the delay scheduler's wheel geometry.
//!
//! Loading these from a file is the hosting process's concern; the core only
//! defines the shapes, defaults, and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout applied to `call`/`call_as` when the caller does not pass
/// an explicit deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Complete entity system configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeridianConfig {
    /// RPC call settings
    pub call: CallConfig,
    /// Property replication flush settings
    pub replication: ReplicationConfig,
    /// Delay scheduler wheel geometry
    pub scheduler: SchedulerConfig,
}

impl MeridianConfig {
    /// Validates the whole configuration tree.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.call.validate()?;
        self.replication.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

/// RPC call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Timeout in milliseconds used when the caller does not pass one
    pub default_timeout_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl CallConfig {
    /// Returns the default timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "call.default_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Property replication flush settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// How often the replication pump drains per-property operation logs (ms)
    pub flush_interval_ms: u64,
    /// Delay handed to the scheduler for each flushed batch (ms)
    pub flush_delay_ms: u64,
    /// Whether flushed batches request FIFO delivery within a scheduler bucket
    pub keep_order: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 50,
            flush_delay_ms: 50,
            keep_order: true,
        }
    }
}

impl ReplicationConfig {
    /// Returns the flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Returns the per-batch scheduling delay as a [`Duration`].
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.flush_interval_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "replication.flush_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Delay scheduler wheel geometry.
///
/// The wheel advances once per `tick_ms` and covers `span_ms` of lookahead;
/// delays beyond the span are clamped to the furthest slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds
    pub tick_ms: u64,
    /// Total lookahead covered by the wheel in milliseconds
    pub span_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            span_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    /// Returns the tick period as a [`Duration`].
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Number of slots in the wheel.
    ///
    /// Degenerate geometry (zero tick, span shorter than a tick) clamps to a
    /// one-slot wheel; `validate()` rejects such configs up front.
    pub fn slot_count(&self) -> usize {
        (self.span_ms / self.tick_ms.max(1)).max(1) as usize
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.tick_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "scheduler.tick_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.span_ms < self.tick_ms {
            return Err(ConfigValidationError::InvalidValue {
                field: "scheduler.span_ms",
                reason: "must cover at least one tick".to_string(),
            });
        }
        if self.span_ms % self.tick_ms != 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "scheduler.span_ms",
                reason: "must be a whole multiple of tick_ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    /// A field holds a value outside its accepted range
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field
        field: &'static str,
        /// Human-readable constraint that was violated
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MeridianConfig::default().validate().is_ok());
    }

    #[test]
    fn default_wheel_matches_tick_and_span() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.span_ms, 1000);
        assert_eq!(config.slot_count(), 20);
    }

    #[test]
    fn degenerate_geometry_clamps_to_one_slot() {
        let config = SchedulerConfig {
            tick_ms: 0,
            span_ms: 0,
        };
        assert_eq!(config.slot_count(), 1);

        let config = SchedulerConfig {
            tick_ms: 100,
            span_ms: 50,
        };
        assert_eq!(config.slot_count(), 1);
    }

    #[test]
    fn rejects_zero_tick() {
        let mut config = MeridianConfig::default();
        config.scheduler.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_misaligned_span() {
        let mut config = MeridianConfig::default();
        config.scheduler.span_ms = 1025;
        assert!(config.validate().is_err());
    }
}
