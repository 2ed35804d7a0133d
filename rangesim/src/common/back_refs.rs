//! Non-owning back references from a child to the objects which own it. Owners hold the child
//! through an `Arc`, the child only keeps a `Weak` to each owner so no ownership cycle is formed.
//! Entries whose owner was dropped are expired and are skipped (and pruned) on access.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) struct BackRefs<T, V: Copy = ()> {
    refs: Mutex<Vec<(Weak<T>, V)>>,
}

impl<T, V: Copy> Default for BackRefs<T, V> {
    fn default() -> Self {
        Self {
            refs: Mutex::new(Vec::new()),
        }
    }
}

impl<T, V: Copy> BackRefs<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owner with an associated value, replacing the value if the owner is already
    /// registered.
    pub fn insert(&self, owner: &Arc<T>, value: V) {
        let mut refs = self.refs.lock();
        refs.retain(|(w, _)| w.strong_count() > 0);
        let weak = Arc::downgrade(owner);
        match refs.iter_mut().find(|(w, _)| w.ptr_eq(&weak)) {
            Some(entry) => entry.1 = value,
            None => refs.push((weak, value)),
        }
    }

    /// Remove an owner, returning its associated value if it was registered.
    pub fn remove(&self, owner: &Arc<T>) -> Option<V> {
        let mut refs = self.refs.lock();
        let weak = Arc::downgrade(owner);
        let position = refs.iter().position(|(w, _)| w.ptr_eq(&weak))?;
        Some(refs.swap_remove(position).1)
    }

    pub fn get(&self, owner: &Arc<T>) -> Option<V> {
        let refs = self.refs.lock();
        let weak = Arc::downgrade(owner);
        refs.iter().find(|(w, _)| w.ptr_eq(&weak)).map(|(_, v)| *v)
    }

    /// Upgrade all owners which are still alive.
    pub fn alive(&self) -> Vec<(Arc<T>, V)> {
        let mut refs = self.refs.lock();
        refs.retain(|(w, _)| w.strong_count() > 0);
        refs.iter()
            .filter_map(|(w, v)| w.upgrade().map(|a| (a, *v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.alive().is_empty()
    }
}
