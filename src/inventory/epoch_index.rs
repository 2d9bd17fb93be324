// Per-parent index of sibling epochs, keyed by code.
//
// For every (parent, code) the index holds the epochs of all siblings with
// that code, sorted by start. Overlap lookups binary-search the first slot
// that starts at or after the queried end, then scan the (small) prefix.

use crate::entities::EntityId;
use crate::temporal::Epoch;
use std::collections::{BTreeMap, HashMap};

/// `None` is the inventory root (networks).
pub type Scope = Option<EntityId>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    epoch: Epoch,
    id: EntityId,
}

#[derive(Debug, Default, Clone)]
pub struct EpochIndex {
    scopes: HashMap<Scope, BTreeMap<String, Vec<Slot>>>,
}

impl EpochIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: Scope, code: &str, epoch: Epoch, id: EntityId) {
        let slots = self
            .scopes
            .entry(scope)
            .or_default()
            .entry(code.to_string())
            .or_default();
        let at = slots.partition_point(|s| s.epoch.start <= epoch.start);
        slots.insert(at, Slot { epoch, id });
    }

    pub fn remove(&mut self, scope: Scope, code: &str, id: EntityId) {
        let Some(codes) = self.scopes.get_mut(&scope) else {
            return;
        };
        if let Some(slots) = codes.get_mut(code) {
            slots.retain(|s| s.id != id);
            if slots.is_empty() {
                codes.remove(code);
            }
        }
        if codes.is_empty() {
            self.scopes.remove(&scope);
        }
    }

    /// Siblings with `code` whose epoch overlaps `epoch`, excluding `ignore`.
    pub fn overlapping(
        &self,
        scope: Scope,
        code: &str,
        epoch: &Epoch,
        ignore: Option<EntityId>,
    ) -> Vec<EntityId> {
        let Some(slots) = self.scopes.get(&scope).and_then(|codes| codes.get(code)) else {
            return Vec::new();
        };
        // Slots starting at or after the queried end cannot overlap it.
        let candidates = match epoch.end {
            Some(end) => slots.partition_point(|s| s.epoch.start < end),
            None => slots.len(),
        };
        slots[..candidates]
            .iter()
            .filter(|s| Some(s.id) != ignore && s.epoch.overlaps(epoch))
            .map(|s| s.id)
            .collect()
    }

    /// All epochs recorded for a code in a scope, by start.
    pub fn epochs(&self, scope: Scope, code: &str) -> Vec<(EntityId, Epoch)> {
        self.scopes
            .get(&scope)
            .and_then(|codes| codes.get(code))
            .map(|slots| slots.iter().map(|s| (s.id, s.epoch)).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
