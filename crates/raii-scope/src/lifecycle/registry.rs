//! Per-scope registry of lifecycle entries

use std::collections::HashMap;
use std::sync::Arc;

use super::entry::Entry;
use super::errors::{LifecycleError, LifecycleResult};
use super::id::ResourceId;

/// Ordered live entries plus the id index
///
/// Structural changes happen only inside queue units; the scope reads it
/// directly for `get`. The owning mutex is never held across an await.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    ordered: Vec<Arc<Entry>>,
    by_id: HashMap<ResourceId, Arc<Entry>>,
    next_seq: u64,
}

impl Registry {
    /// Reserve a sequence number, failing if `id` is already claimed
    pub(crate) fn claim(&mut self, id: Option<&ResourceId>) -> LifecycleResult<u64> {
        if let Some(id) = id {
            if self.by_id.contains_key(id) {
                return Err(LifecycleError::DuplicateId(id.clone()));
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(seq)
    }

    /// Index a freshly claimed entry under its id
    pub(crate) fn register(&mut self, entry: &Arc<Entry>) {
        if let Some(id) = entry.id() {
            self.by_id.insert(id.clone(), Arc::clone(entry));
        }
    }

    pub(crate) fn lookup(&self, id: &ResourceId) -> Option<Arc<Entry>> {
        self.by_id.get(id).cloned()
    }

    /// Sequence numbers below this value belong to entries claimed so far
    pub(crate) fn horizon(&self) -> u64 {
        self.next_seq
    }

    /// Append a constructed entry unless a destroy was requested meanwhile
    pub(crate) fn commit(&mut self, entry: &Arc<Entry>) -> bool {
        if entry.is_pending_destroy() {
            return false;
        }
        self.ordered.push(Arc::clone(entry));
        true
    }

    /// Drop the entry from both `ordered` and `by_id`
    pub(crate) fn remove(&mut self, entry: &Arc<Entry>) {
        self.ordered.retain(|live| !Arc::ptr_eq(live, entry));
        if let Some(id) = entry.id() {
            if self.by_id.get(id).is_some_and(|indexed| Arc::ptr_eq(indexed, entry)) {
                self.by_id.remove(id);
            }
        }
    }

    /// Live entries, most recently committed first
    pub(crate) fn teardown_order(&self) -> Vec<Arc<Entry>> {
        self.ordered.iter().rev().cloned().collect()
    }

    /// Id is claimed and not flagged for destruction
    pub(crate) fn contains(&self, id: &ResourceId) -> bool {
        self.by_id.get(id).is_some_and(|entry| !entry.is_pending_destroy())
    }

    pub(crate) fn live_count(&self) -> usize {
        self.ordered.len()
    }
}
