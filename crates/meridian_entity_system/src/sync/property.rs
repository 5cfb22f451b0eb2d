//! Property replication driver.
//!
//! Wraps each replicated field so that every mutating access emits exactly one
//! sync operation record into that property's log, guarded against writes to
//! frozen entities and shadow replicas. The shadow side applies inbound
//! batches through [`PropertyTree::apply_sync`], which bypasses the guard and
//! never records.

use super::log::{RecordOutcome, SyncOpLog};
use super::record::{PropertyKind, SyncKey, SyncOp};
use super::SyncError;
use crate::args::ArgValue;
use crate::entity::Lifecycle;
use crate::stats::ReplicationStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which side of the replication relationship owns a property tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOwnership {
    /// The declaring entity; mutations originate here
    Authoritative,
    /// A read-only remote mirror; overwritten only by inbound sync
    Shadow,
}

/// Replication policy flags of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Push coalesced mutations to subscribed shadows
    pub push_to_shadow: bool,
    /// Persist the value to the external store (backend is out of core scope)
    pub persist: bool,
}

impl ReplicationPolicy {
    /// Neither replicated nor persisted; visible to the owner only.
    pub const OWNER_ONLY: Self = Self {
        push_to_shadow: false,
        persist: false,
    };
    /// Pushed to shadows, not persisted.
    pub const SHADOWED: Self = Self {
        push_to_shadow: true,
        persist: false,
    };
    /// Persisted, not pushed.
    pub const PERSISTED: Self = Self {
        push_to_shadow: false,
        persist: true,
    };
    /// Pushed to shadows and persisted.
    pub const SHADOWED_PERSISTED: Self = Self {
        push_to_shadow: true,
        persist: true,
    };
}

/// One replicated field: current value plus its pending operation log.
#[derive(Debug)]
pub struct ReplicatedProperty {
    path: String,
    kind: PropertyKind,
    policy: ReplicationPolicy,
    value: ArgValue,
    log: SyncOpLog,
}

impl ReplicatedProperty {
    fn new(
        path: String,
        kind: PropertyKind,
        policy: ReplicationPolicy,
        initial: ArgValue,
    ) -> Result<Self, SyncError> {
        match (kind, &initial) {
            (PropertyKind::List, ArgValue::List(_))
            | (PropertyKind::Dict, ArgValue::Dict(_))
            | (PropertyKind::Plain, _) => Ok(Self {
                path,
                kind,
                policy,
                value: initial,
                log: SyncOpLog::new(kind),
            }),
            _ => Err(SyncError::KindMismatch {
                path,
                kind,
                op: "declare",
            }),
        }
    }

    /// Dot-addressed path of this property.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared kind.
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Replication policy flags.
    pub fn policy(&self) -> ReplicationPolicy {
        self.policy
    }

    /// Current value (owner-side truth, or last applied sync on a shadow).
    pub fn value(&self) -> &ArgValue {
        &self.value
    }

    /// Number of pending records in the operation log.
    pub fn pending_len(&self) -> usize {
        self.log.len()
    }

    fn set(&mut self, value: ArgValue) -> Result<RecordOutcome, SyncError> {
        self.value = value.clone();
        Ok(self.log.record(SyncOp::SetValue(value)))
    }

    fn list_add(&mut self, item: ArgValue) -> Result<RecordOutcome, SyncError> {
        let items = self.list_value_mut("add")?;
        items.push(item.clone());
        Ok(self.log.record(SyncOp::AddElem(vec![item])))
    }

    fn list_insert(&mut self, index: u32, item: ArgValue) -> Result<RecordOutcome, SyncError> {
        let items = self.list_value_mut("insert")?;
        if index as usize > items.len() {
            let len = items.len();
            return Err(SyncError::BadOperand {
                path: self.path.clone(),
                detail: format!("insert index {index} beyond length {len}"),
            });
        }
        items.insert(index as usize, item.clone());
        Ok(self.log.record(SyncOp::InsertElem(vec![(index, item)])))
    }

    fn list_remove(&mut self, index: u32) -> Result<RecordOutcome, SyncError> {
        let items = self.list_value_mut("remove")?;
        if index as usize >= items.len() {
            let len = items.len();
            return Err(SyncError::BadOperand {
                path: self.path.clone(),
                detail: format!("remove index {index} beyond length {len}"),
            });
        }
        items.remove(index as usize);
        Ok(self
            .log
            .record(SyncOp::RemoveElem(vec![SyncKey::Index(index)])))
    }

    fn dict_update(&mut self, key: &str, value: ArgValue) -> Result<RecordOutcome, SyncError> {
        let pairs = self.dict_value_mut("update")?;
        pairs.insert(key.to_string(), value.clone());
        Ok(self.log.record(SyncOp::UpdateDict(BTreeMap::from([(
            key.to_string(),
            value,
        )]))))
    }

    /// Removing an absent key records nothing: the consumer already agrees.
    fn dict_remove(&mut self, key: &str) -> Result<Option<RecordOutcome>, SyncError> {
        let pairs = self.dict_value_mut("remove")?;
        if pairs.remove(key).is_none() {
            return Ok(None);
        }
        Ok(Some(self.log.record(SyncOp::RemoveElem(vec![
            SyncKey::Field(key.to_string()),
        ]))))
    }

    fn clear(&mut self) -> Result<RecordOutcome, SyncError> {
        match self.kind {
            PropertyKind::List => self.value = ArgValue::empty_list(),
            PropertyKind::Dict => self.value = ArgValue::empty_dict(),
            PropertyKind::Plain => {
                return Err(SyncError::KindMismatch {
                    path: self.path.clone(),
                    kind: self.kind,
                    op: "clear",
                })
            }
        }
        Ok(self.log.record(SyncOp::Clear))
    }

    /// Applies one inbound sync record to the current value (shadow side).
    fn apply(&mut self, op: SyncOp) -> Result<(), SyncError> {
        match op {
            SyncOp::SetValue(value) => {
                self.value = value;
                Ok(())
            }
            SyncOp::Clear => {
                self.value = match self.kind {
                    PropertyKind::List => ArgValue::empty_list(),
                    PropertyKind::Dict => ArgValue::empty_dict(),
                    PropertyKind::Plain => {
                        return Err(SyncError::KindMismatch {
                            path: self.path.clone(),
                            kind: self.kind,
                            op: "clear",
                        })
                    }
                };
                Ok(())
            }
            SyncOp::AddElem(new_items) => {
                let items = self.list_value_mut("add")?;
                items.extend(new_items);
                Ok(())
            }
            SyncOp::InsertElem(entries) => {
                let path = self.path.clone();
                let items = self.list_value_mut("insert")?;
                for (index, item) in entries {
                    if index as usize > items.len() {
                        return Err(SyncError::BadOperand {
                            path,
                            detail: format!("insert index {index} beyond length {}", items.len()),
                        });
                    }
                    items.insert(index as usize, item);
                }
                Ok(())
            }
            SyncOp::RemoveElem(keys) => {
                let path = self.path.clone();
                for key in keys {
                    match key {
                        SyncKey::Index(index) => {
                            let items = self.list_value_mut("remove")?;
                            if index as usize >= items.len() {
                                return Err(SyncError::BadOperand {
                                    path,
                                    detail: format!(
                                        "remove index {index} beyond length {}",
                                        items.len()
                                    ),
                                });
                            }
                            items.remove(index as usize);
                        }
                        SyncKey::Field(field) => {
                            let pairs = self.dict_value_mut("remove")?;
                            pairs.remove(&field);
                        }
                    }
                }
                Ok(())
            }
            SyncOp::UpdateDict(new_pairs) => {
                let pairs = self.dict_value_mut("update")?;
                pairs.extend(new_pairs);
                Ok(())
            }
        }
    }

    fn list_value_mut(&mut self, op: &'static str) -> Result<&mut Vec<ArgValue>, SyncError> {
        match &mut self.value {
            ArgValue::List(items) => Ok(items),
            _ => Err(SyncError::KindMismatch {
                path: self.path.clone(),
                kind: self.kind,
                op,
            }),
        }
    }

    fn dict_value_mut(
        &mut self,
        op: &'static str,
    ) -> Result<&mut BTreeMap<String, ArgValue>, SyncError> {
        match &mut self.value {
            ArgValue::Dict(pairs) => Ok(pairs),
            _ => Err(SyncError::KindMismatch {
                path: self.path.clone(),
                kind: self.kind,
                op,
            }),
        }
    }
}

/// All replicated properties of one entity, keyed by path.
///
/// The tree is mutated by the owning entity's logic and drained by the flush
/// path; both go through the same mutex so draining never races a mutation.
#[derive(Debug)]
pub struct PropertyTree {
    ownership: PropertyOwnership,
    lifecycle: Arc<Lifecycle>,
    properties: Mutex<BTreeMap<String, ReplicatedProperty>>,
    stats: Arc<ReplicationStats>,
}

impl PropertyTree {
    /// Creates an empty tree bound to its owner's lifecycle flags.
    pub fn new(
        ownership: PropertyOwnership,
        lifecycle: Arc<Lifecycle>,
        stats: Arc<ReplicationStats>,
    ) -> Self {
        Self {
            ownership,
            lifecycle,
            properties: Mutex::new(BTreeMap::new()),
            stats,
        }
    }

    /// Which side of the replication relationship this tree is.
    pub fn ownership(&self) -> PropertyOwnership {
        self.ownership
    }

    /// Declares a replicated property. Shadow trees declare the same paths as
    /// their authoritative counterpart so inbound batches can resolve.
    pub async fn declare(
        &self,
        path: impl Into<String>,
        kind: PropertyKind,
        policy: ReplicationPolicy,
        initial: ArgValue,
    ) -> Result<(), SyncError> {
        let path = path.into();
        let mut properties = self.properties.lock().await;
        if properties.contains_key(&path) {
            return Err(SyncError::DuplicateProperty(path));
        }
        let property = ReplicatedProperty::new(path.clone(), kind, policy, initial)?;
        properties.insert(path, property);
        Ok(())
    }

    /// Whole-value assignment.
    pub async fn set(&self, path: &str, value: ArgValue) -> Result<(), SyncError> {
        self.mutate(path, |property| property.set(value)).await
    }

    /// Appends an item to a list property.
    pub async fn list_add(&self, path: &str, item: ArgValue) -> Result<(), SyncError> {
        self.mutate(path, |property| property.list_add(item)).await
    }

    /// Inserts an item at an explicit position in a list property.
    pub async fn list_insert(
        &self,
        path: &str,
        index: u32,
        item: ArgValue,
    ) -> Result<(), SyncError> {
        self.mutate(path, |property| property.list_insert(index, item))
            .await
    }

    /// Removes the item at `index` from a list property.
    pub async fn list_remove(&self, path: &str, index: u32) -> Result<(), SyncError> {
        self.mutate(path, |property| property.list_remove(index))
            .await
    }

    /// Upserts one key of a dict property.
    pub async fn dict_update(
        &self,
        path: &str,
        key: &str,
        value: ArgValue,
    ) -> Result<(), SyncError> {
        self.mutate(path, |property| property.dict_update(key, value))
            .await
    }

    /// Removes one key of a dict property.
    pub async fn dict_remove(&self, path: &str, key: &str) -> Result<(), SyncError> {
        self.guard(path)?;
        let mut properties = self.properties.lock().await;
        let property = properties
            .get_mut(path)
            .ok_or_else(|| SyncError::UnknownProperty(path.to_string()))?;
        if let Some(outcome) = property.dict_remove(key)? {
            self.count(outcome);
        }
        Ok(())
    }

    /// Empties a list or dict property.
    pub async fn clear(&self, path: &str) -> Result<(), SyncError> {
        self.mutate(path, |property| property.clear()).await
    }

    /// Returns a copy of the current value at `path`.
    pub async fn value(&self, path: &str) -> Result<ArgValue, SyncError> {
        let properties = self.properties.lock().await;
        properties
            .get(path)
            .map(|property| property.value().clone())
            .ok_or_else(|| SyncError::UnknownProperty(path.to_string()))
    }

    /// Number of pending records queued for `path`, for tests and monitoring.
    pub async fn pending_len(&self, path: &str) -> Result<usize, SyncError> {
        let properties = self.properties.lock().await;
        properties
            .get(path)
            .map(|property| property.pending_len())
            .ok_or_else(|| SyncError::UnknownProperty(path.to_string()))
    }

    /// Drains the pending logs of every shadow-pushed property.
    pub async fn drain_replicated(&self) -> Vec<(String, Vec<SyncOp>)> {
        let mut properties = self.properties.lock().await;
        let mut drained = Vec::new();
        for (path, property) in properties.iter_mut() {
            if property.policy().push_to_shadow && property.pending_len() > 0 {
                drained.push((path.clone(), property.log.drain()));
            }
        }
        drained
    }

    /// Applies an inbound batch of sync records to a shadow tree.
    pub async fn apply_sync(&self, path: &str, records: Vec<SyncOp>) -> Result<(), SyncError> {
        if self.ownership != PropertyOwnership::Shadow {
            return Err(SyncError::NotAShadow(path.to_string()));
        }
        let mut properties = self.properties.lock().await;
        let property = properties
            .get_mut(path)
            .ok_or_else(|| SyncError::UnknownProperty(path.to_string()))?;
        for op in records {
            property.apply(op)?;
        }
        Ok(())
    }

    async fn mutate<F>(&self, path: &str, apply: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut ReplicatedProperty) -> Result<RecordOutcome, SyncError>,
    {
        self.guard(path)?;
        let mut properties = self.properties.lock().await;
        let property = properties
            .get_mut(path)
            .ok_or_else(|| SyncError::UnknownProperty(path.to_string()))?;
        let outcome = apply(property)?;
        self.count(outcome);
        Ok(())
    }

    /// Rejects mutations on shadow trees and on frozen/destroyed owners before
    /// anything reaches a sync queue.
    fn guard(&self, path: &str) -> Result<(), SyncError> {
        if self.ownership == PropertyOwnership::Shadow {
            self.stats.mutations_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SyncError::ShadowMutation {
                path: path.to_string(),
            });
        }
        let state = self.lifecycle.state();
        if state != crate::types::EntityState::Active {
            self.stats.mutations_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SyncError::EntityInactive {
                path: path.to_string(),
                state,
            });
        }
        Ok(())
    }

    fn count(&self, outcome: RecordOutcome) {
        self.stats.ops_recorded.fetch_add(1, Ordering::Relaxed);
        if matches!(outcome, RecordOutcome::Coalesced | RecordOutcome::Reset) {
            self.stats.ops_coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }
}
