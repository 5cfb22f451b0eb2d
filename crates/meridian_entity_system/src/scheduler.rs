//! # Delay Scheduler
//!
//! A bucketed time wheel that decouples "a mutation happened" from "a network
//! send happened". Flushed sync batches enter as `(batch, delay, keep_order)`
//! triples; the wheel advances on a fixed tick (50 ms by default, covering
//! 1000 ms of lookahead) and releases the due bucket to the transport.
//!
//! Entries within one bucket drain in insertion order, which satisfies the
//! FIFO guarantee for `keep_order` entries; for everything else the order is
//! simply unspecified. A transport failure cancels only the failed entry and
//! is reported on the error channel; it never stalls the tick.

use crate::config::SchedulerConfig;
use crate::messages::{PropertySyncBatch, WireMessage};
use crate::shutdown::ShutdownState;
use crate::stats::{SchedulerStats, SchedulerStatsSnapshot};
use crate::transport::{Transport, TransportError};
use crate::types::Mailbox;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A batch waiting in the wheel for its due tick.
#[derive(Debug)]
pub struct ScheduledEntry {
    /// Sequence number in arrival order, strictly increasing
    pub seq: u64,
    /// The sync batch to transmit
    pub batch: PropertySyncBatch,
    /// Whether the caller requested FIFO delivery within the bucket
    pub keep_order: bool,
}

/// Error reported when a due entry could not be flushed.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The transport refused the batch; the entry is dropped, later ticks
    /// proceed normally
    #[error("failed to flush sync batch to {target}: {source}")]
    Flush {
        /// Mailbox the batch was destined for
        target: Mailbox,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },
}

#[derive(Debug)]
struct Wheel {
    slots: Vec<VecDeque<ScheduledEntry>>,
    cursor: usize,
}

/// Bucketed timer structure batching outbound sync traffic.
#[derive(Debug)]
pub struct DelayScheduler {
    config: SchedulerConfig,
    wheel: Mutex<Wheel>,
    seq: AtomicU64,
    stats: SchedulerStats,
}

impl DelayScheduler {
    /// Creates a wheel with the given geometry.
    pub fn new(config: SchedulerConfig) -> Arc<Self> {
        let slots = (0..config.slot_count()).map(|_| VecDeque::new()).collect();
        Arc::new(Self {
            config,
            wheel: Mutex::new(Wheel { slots, cursor: 0 }),
            seq: AtomicU64::new(0),
            stats: SchedulerStats::default(),
        })
    }

    /// Tick period of the wheel.
    pub fn tick(&self) -> Duration {
        self.config.tick()
    }

    /// Accepts a batch for delivery after roughly `delay`.
    ///
    /// The delay is rounded up to whole ticks and clamped to the wheel span;
    /// a zero delay still waits for the next tick, which is what allows many
    /// same-tick mutations to coalesce into one batch upstream.
    pub async fn schedule(&self, batch: PropertySyncBatch, delay: Duration, keep_order: bool) {
        let slot_count = self.config.slot_count();
        let tick_ms = self.config.tick_ms.max(1);
        let delay_ms = delay.as_millis() as u64;
        let ticks_ahead = (delay_ms.div_ceil(tick_ms) as usize).clamp(1, slot_count);

        let entry = ScheduledEntry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            batch,
            keep_order,
        };

        let mut wheel = self.wheel.lock().await;
        let index = (wheel.cursor + ticks_ahead) % slot_count;
        wheel.slots[index].push_back(entry);
        self.stats.entries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Advances the wheel one tick and returns the due bucket, oldest first.
    pub async fn advance(&self) -> Vec<ScheduledEntry> {
        let mut wheel = self.wheel.lock().await;
        let slot_count = wheel.slots.len();
        wheel.cursor = (wheel.cursor + 1) % slot_count;
        let cursor = wheel.cursor;
        std::mem::take(&mut wheel.slots[cursor]).into()
    }

    /// Number of entries waiting across all buckets.
    pub async fn pending_len(&self) -> usize {
        let wheel = self.wheel.lock().await;
        wheel.slots.iter().map(|slot| slot.len()).sum()
    }

    /// Scheduler counters.
    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Advances one tick and transmits every due entry.
    ///
    /// Send failures are counted, reported on `errors`, and do not prevent
    /// the remaining entries of the bucket from flushing.
    pub async fn flush_due(
        &self,
        transport: &Arc<dyn Transport>,
        errors: &mpsc::UnboundedSender<SchedulerError>,
    ) {
        let due = self.advance().await;
        for entry in due {
            let target = entry.batch.target.clone();
            match transport
                .send(&target, WireMessage::SyncBatch(entry.batch))
                .await
            {
                Ok(()) => {
                    self.stats.entries_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(source) => {
                    self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(target = %target, error = %source, "scheduled sync batch dropped");
                    let _ = errors.send(SchedulerError::Flush { target, source });
                }
            }
        }
    }

    /// Spawns the periodic tick loop.
    pub fn spawn_pump(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        errors: mpsc::UnboundedSender<SchedulerError>,
        shutdown: ShutdownState,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.tick());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if shutdown.is_shutdown_initiated() {
                    debug!("delay scheduler pump stopping");
                    break;
                }
                scheduler.flush_due(&transport, &errors).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgValue;
    use crate::sync::record::SyncOp;
    use crate::types::EntityId;

    fn batch(id: &str) -> PropertySyncBatch {
        PropertySyncBatch {
            target: Mailbox::new("shadow-host", 7200, 0, EntityId::new(id)),
            path: "pos".to_string(),
            records: vec![SyncOp::SetValue(ArgValue::Int(1))],
        }
    }

    #[tokio::test]
    async fn entries_come_due_after_their_delay() {
        let scheduler = DelayScheduler::new(SchedulerConfig::default());
        scheduler
            .schedule(batch("A"), Duration::from_millis(50), true)
            .await;
        scheduler
            .schedule(batch("B"), Duration::from_millis(100), true)
            .await;

        let first = scheduler.advance().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].batch.target.id, EntityId::new("A"));

        let second = scheduler.advance().await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].batch.target.id, EntityId::new("B"));
    }

    #[tokio::test]
    async fn bucket_preserves_fifo_for_keep_order() {
        let scheduler = DelayScheduler::new(SchedulerConfig::default());
        for i in 0..5 {
            scheduler
                .schedule(batch(&format!("E{i}")), Duration::from_millis(50), true)
                .await;
        }
        let due = scheduler.advance().await;
        assert_eq!(due.len(), 5);
        for (i, entry) in due.iter().enumerate() {
            assert_eq!(entry.batch.target.id, EntityId::new(&format!("E{i}")));
            assert!(entry.seq >= i as u64);
        }
    }

    #[tokio::test]
    async fn delays_beyond_span_clamp_to_furthest_slot() {
        let scheduler = DelayScheduler::new(SchedulerConfig::default());
        scheduler
            .schedule(batch("far"), Duration::from_secs(30), false)
            .await;

        // 20 slots of 50 ms; the entry must surface on the 20th advance.
        for _ in 0..19 {
            assert!(scheduler.advance().await.is_empty());
        }
        let due = scheduler.advance().await;
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn unvalidated_degenerate_config_yields_a_usable_wheel() {
        let scheduler = DelayScheduler::new(SchedulerConfig {
            tick_ms: 0,
            span_ms: 0,
        });
        scheduler
            .schedule(batch("A"), Duration::from_millis(500), false)
            .await;
        let due = scheduler.advance().await;
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn zero_delay_waits_one_tick() {
        let scheduler = DelayScheduler::new(SchedulerConfig::default());
        scheduler.schedule(batch("now"), Duration::ZERO, false).await;
        let due = scheduler.advance().await;
        assert_eq!(due.len(), 1);
    }
}
