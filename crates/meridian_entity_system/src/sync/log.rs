//! Per-property sync operation log with coalescing merge rules.
//!
//! The log holds the not-yet-flushed mutation records for exactly one
//! replicated property. Every insertion runs the merge step first, so after
//! any `record` the queue holds the *minimal* operation sequence reproducing
//! the net change since the last flush. A property mutated every tick keeps a
//! bounded queue (one record per run of same-kind ops, one update/removal
//! record per distinct dict key) instead of growing with the mutation count.

use super::record::{PropertyKind, SyncKey, SyncOp};
use std::collections::VecDeque;

/// What the merge step did with a freshly recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended as a new queue entry
    Appended,
    /// Folded into an already-queued record
    Coalesced,
    /// Discarded the queue and became the sole entry (whole-value ops)
    Reset,
}

/// Ordered queue of pending sync operations for one property.
#[derive(Debug)]
pub struct SyncOpLog {
    kind: PropertyKind,
    queue: VecDeque<SyncOp>,
}

impl SyncOpLog {
    /// Creates an empty log for a property of the given kind.
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            queue: VecDeque::new(),
        }
    }

    /// Kind of the property this log belongs to.
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Read-only view of the pending records, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &SyncOp> {
        self.queue.iter()
    }

    /// Removes and returns all pending records, oldest first.
    pub fn drain(&mut self) -> Vec<SyncOp> {
        self.queue.drain(..).collect()
    }

    /// Accepts one mutation record, merging it into the queue.
    ///
    /// Records apply in strict arrival order: a whole-value op (`SetValue` on
    /// a dict, `Clear`) discards everything queued before it and later ops
    /// append normally, so flushing is last-writer-wins.
    pub fn record(&mut self, op: SyncOp) -> RecordOutcome {
        match self.kind {
            PropertyKind::Plain => self.record_plain(op),
            PropertyKind::List => self.record_list(op),
            PropertyKind::Dict => self.record_dict(op),
        }
    }

    /// Plain values only ever see whole-value sets, so the queue never holds
    /// more than one record.
    fn record_plain(&mut self, op: SyncOp) -> RecordOutcome {
        if let SyncOp::SetValue(value) = op {
            if let Some(SyncOp::SetValue(slot)) = self.queue.back_mut() {
                *slot = value;
                return RecordOutcome::Coalesced;
            }
            self.queue.push_back(SyncOp::SetValue(value));
            return RecordOutcome::Appended;
        }
        self.queue.push_back(op);
        RecordOutcome::Appended
    }

    /// List semantics are index-sensitive, so order across different op kinds
    /// must be preserved; only consecutive runs of the same kind merge.
    fn record_list(&mut self, op: SyncOp) -> RecordOutcome {
        if matches!(op, SyncOp::Clear) {
            self.queue.clear();
            self.queue.push_back(SyncOp::Clear);
            return RecordOutcome::Reset;
        }
        let op = match self.queue.back_mut() {
            Some(last) if last.kind() == op.kind() => match (last, op) {
                (SyncOp::SetValue(slot), SyncOp::SetValue(value)) => {
                    *slot = value;
                    return RecordOutcome::Coalesced;
                }
                (SyncOp::AddElem(items), SyncOp::AddElem(more)) => {
                    items.extend(more);
                    return RecordOutcome::Coalesced;
                }
                (SyncOp::InsertElem(entries), SyncOp::InsertElem(more)) => {
                    entries.extend(more);
                    return RecordOutcome::Coalesced;
                }
                (SyncOp::RemoveElem(keys), SyncOp::RemoveElem(more)) => {
                    keys.extend(more);
                    return RecordOutcome::Coalesced;
                }
                (_, op) => op,
            },
            _ => op,
        };
        self.queue.push_back(op);
        RecordOutcome::Appended
    }

    /// Dict records merge by key. The queue holds at most one base record
    /// (`SetValue`/`Clear`), one update record and one removal record, with
    /// the update and removal key sets kept disjoint by cancellation.
    fn record_dict(&mut self, op: SyncOp) -> RecordOutcome {
        match op {
            SyncOp::SetValue(_) | SyncOp::Clear => {
                self.queue.clear();
                self.queue.push_back(op);
                RecordOutcome::Reset
            }
            SyncOp::UpdateDict(pairs) => {
                for key in pairs.keys() {
                    self.cancel_dict_removal(key);
                }
                self.drop_empty_records();
                if let Some(SyncOp::UpdateDict(existing)) = self
                    .queue
                    .iter_mut()
                    .find(|queued| matches!(queued, SyncOp::UpdateDict(_)))
                {
                    existing.extend(pairs);
                    RecordOutcome::Coalesced
                } else {
                    self.queue.push_back(SyncOp::UpdateDict(pairs));
                    RecordOutcome::Appended
                }
            }
            SyncOp::RemoveElem(keys) => {
                for key in &keys {
                    if let SyncKey::Field(field) = key {
                        self.cancel_dict_update(field);
                    }
                }
                self.drop_empty_records();
                if let Some(SyncOp::RemoveElem(existing)) = self
                    .queue
                    .iter_mut()
                    .find(|queued| matches!(queued, SyncOp::RemoveElem(_)))
                {
                    for key in keys {
                        if !existing.contains(&key) {
                            existing.push(key);
                        }
                    }
                    RecordOutcome::Coalesced
                } else {
                    self.queue.push_back(SyncOp::RemoveElem(keys));
                    RecordOutcome::Appended
                }
            }
            // Positional ops are not meaningful on dicts; preserved verbatim so
            // a mis-declared property still flushes in order.
            other => {
                self.queue.push_back(other);
                RecordOutcome::Appended
            }
        }
    }

    /// Removes `key` from any queued removal record.
    fn cancel_dict_removal(&mut self, key: &str) {
        for queued in self.queue.iter_mut() {
            if let SyncOp::RemoveElem(keys) = queued {
                keys.retain(|k| !matches!(k, SyncKey::Field(field) if field == key));
            }
        }
    }

    /// Removes `key` from any queued update record.
    fn cancel_dict_update(&mut self, key: &str) {
        for queued in self.queue.iter_mut() {
            if let SyncOp::UpdateDict(pairs) = queued {
                pairs.remove(key);
            }
        }
    }

    /// Drops records that cancellation emptied; an empty record would flush as
    /// a no-op.
    fn drop_empty_records(&mut self) {
        self.queue.retain(|queued| !queued.is_empty_operand());
    }
}
