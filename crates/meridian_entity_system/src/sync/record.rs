//! Sync operation records: one coalesced unit of change for a replicated
//! property, destined for the wire.

use crate::args::ArgValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape of a replicated property, which selects the merge rules applied to
/// its operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Single value; every mutation is a whole-value set
    Plain,
    /// Index-addressed ordered container
    List,
    /// String-keyed container
    Dict,
}

/// Key operand of a removal operation: list removals address by index, dict
/// removals address by field name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SyncKey {
    /// Position inside a list property
    Index(u32),
    /// Field name inside a dict property
    Field(String),
}

impl std::fmt::Display for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKey::Index(i) => write!(f, "[{i}]"),
            SyncKey::Field(k) => write!(f, ".{k}"),
        }
    }
}

/// A single mutation record for a replicated property.
///
/// Records are produced once per mutating call on a property and are immutable
/// afterwards, except for the coalescing step inside the per-property log which
/// may fold a new record into an already-queued one or drop queued records that
/// a later record made redundant.
///
/// The serde representation *is* the wire rendering of the record; `Clear`
/// intentionally carries no operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "operand")]
pub enum SyncOp {
    /// Whole-value replacement
    SetValue(ArgValue),
    /// Key/value upserts on a dict property
    UpdateDict(BTreeMap<String, ArgValue>),
    /// Items appended to the end of a list property, in order
    AddElem(Vec<ArgValue>),
    /// Items inserted at explicit list positions, in order
    InsertElem(Vec<(u32, ArgValue)>),
    /// Keys removed from a list or dict property, in order
    RemoveElem(Vec<SyncKey>),
    /// Container emptied; discards everything queued before it
    Clear,
}

/// Discriminant of a [`SyncOp`], used by the merge rules to detect runs of the
/// same operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncOpKind {
    SetValue,
    UpdateDict,
    AddElem,
    InsertElem,
    RemoveElem,
    Clear,
}

impl SyncOp {
    /// Returns the operation discriminant.
    pub fn kind(&self) -> SyncOpKind {
        match self {
            SyncOp::SetValue(_) => SyncOpKind::SetValue,
            SyncOp::UpdateDict(_) => SyncOpKind::UpdateDict,
            SyncOp::AddElem(_) => SyncOpKind::AddElem,
            SyncOp::InsertElem(_) => SyncOpKind::InsertElem,
            SyncOp::RemoveElem(_) => SyncOpKind::RemoveElem,
            SyncOp::Clear => SyncOpKind::Clear,
        }
    }

    /// Serializes the record into its wire representation.
    ///
    /// The rendering is operation-specific: operand-carrying records become a
    /// tagged `{op, operand}` object, `Clear` serializes with no payload.
    pub fn to_sync_command(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Returns true when the record carries no operand payload and would be a
    /// no-op on the consumer side. Used to drop emptied records after key
    /// cancellation instead of flushing them.
    pub fn is_empty_operand(&self) -> bool {
        match self {
            SyncOp::UpdateDict(pairs) => pairs.is_empty(),
            SyncOp::AddElem(items) => items.is_empty(),
            SyncOp::InsertElem(entries) => entries.is_empty(),
            SyncOp::RemoveElem(keys) => keys.is_empty(),
            SyncOp::SetValue(_) | SyncOp::Clear => false,
        }
    }
}
