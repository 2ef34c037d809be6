#![forbid(unsafe_code)]

//! Weak-keyed map from target objects to caller-defined slot values.
//!
//! Associates auxiliary data with an object without extending its lifetime:
//! the map's keys are [`WeakHandle`]s, whose frozen hash and identity
//! equality keep entries locatable — and removable — after their target is
//! reclaimed. Lookup by a live object probes the map with a freshly built
//! handle: same allocation, same frozen hash, same bucket.
//!
//! Dead keys discovered during iteration are queued and removed by
//! [`purge_dead`](TargetMap::purge_dead), never mid-walk.
//!
//! This is a plain collection with `&mut self` mutation; callers that share
//! it across threads wrap it in their own lock.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use tether_core::{AnyObject, WeakHandle};

struct TargetEntry<V> {
    marked: bool,
    values: Vec<V>,
}

/// Weak-keyed map from target identity to a deduplicated list of `V` slots.
///
/// A target may additionally be *marked*, placing it in a caller-defined
/// subset that can be iterated separately (e.g. the targets that themselves
/// participate in a resolution chain).
pub struct TargetMap<V> {
    targets: AHashMap<WeakHandle, TargetEntry<V>>,
    dead: Vec<WeakHandle>,
}

impl<V: PartialEq> TargetMap<V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            targets: AHashMap::new(),
            dead: Vec::new(),
        }
    }

    /// Number of targets, dead-but-unpurged ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Register a target and return its key handle. Idempotent: a target
    /// already present keeps its entry and the existing handle is returned.
    pub fn add_target<T: Any + Send + Sync>(&mut self, target: &Arc<T>) -> WeakHandle {
        self.insert_target(WeakHandle::new(target), false)
    }

    /// Like [`add_target`](TargetMap::add_target), additionally placing the
    /// target in the marked subset. Marking an already-present target
    /// upgrades it into the subset.
    pub fn add_target_marked<T: Any + Send + Sync>(&mut self, target: &Arc<T>) -> WeakHandle {
        self.insert_target(WeakHandle::new(target), true)
    }

    fn insert_target(&mut self, probe: WeakHandle, marked: bool) -> WeakHandle {
        let existing = self
            .targets
            .get_key_value(&probe)
            .map(|(key, entry)| (key.clone(), entry.marked));

        if let Some((key, already_marked)) = existing {
            if marked && !already_marked {
                if let Some(entry) = self.targets.get_mut(&key) {
                    entry.marked = true;
                }
            }
            return key;
        }

        self.targets.insert(
            probe.clone(),
            TargetEntry {
                marked,
                values: Vec::new(),
            },
        );
        probe
    }

    /// Attach a slot value to a registered target. Returns whether the value
    /// was newly added; `false` when it was already present or when `key`
    /// matches no target.
    pub fn add_value(&mut self, key: &WeakHandle, value: V) -> bool {
        let Some(entry) = self.targets.get_mut(key) else {
            return false;
        };
        if entry.values.contains(&value) {
            return false;
        }
        entry.values.push(value);
        true
    }

    /// Find the key handle for a live target, if it is registered.
    #[must_use]
    pub fn find_key<T: Any + Send + Sync>(&self, target: &Arc<T>) -> Option<WeakHandle> {
        let probe = WeakHandle::new(target);
        self.targets.get_key_value(&probe).map(|(key, _)| key.clone())
    }

    /// Whether `target` is registered with `value` attached.
    #[must_use]
    pub fn is_connected<T: Any + Send + Sync>(&self, target: &Arc<T>, value: &V) -> bool {
        let probe = WeakHandle::new(target);
        self.targets
            .get(&probe)
            .is_some_and(|entry| entry.values.contains(value))
    }

    /// Detach a slot value from a target. When the last value goes, the
    /// whole target entry goes with it. Returns whether a value was removed.
    pub fn remove_value<T: Any + Send + Sync>(&mut self, target: &Arc<T>, value: &V) -> bool {
        let probe = WeakHandle::new(target);
        let Some(entry) = self.targets.get_mut(&probe) else {
            return false;
        };
        let Some(position) = entry.values.iter().position(|held| held == value) else {
            return false;
        };

        entry.values.remove(position);
        if entry.values.is_empty() {
            self.targets.remove(&probe);
        }
        true
    }

    /// Visit `(target, value)` for every slot of every live target. Dead
    /// keys found along the way are queued for [`purge_dead`].
    ///
    /// [`purge_dead`]: TargetMap::purge_dead
    pub fn for_each_live(&mut self, mut f: impl FnMut(&Arc<AnyObject>, &V)) {
        let Self { targets, dead } = self;
        for (key, entry) in targets.iter() {
            match key.resolve() {
                Some(target) => {
                    for value in &entry.values {
                        f(&target, value);
                    }
                }
                None => dead.push(key.clone()),
            }
        }
    }

    /// Like [`for_each_live`](TargetMap::for_each_live), restricted to the
    /// marked subset.
    pub fn for_each_marked_live(&mut self, mut f: impl FnMut(&Arc<AnyObject>, &V)) {
        let Self { targets, dead } = self;
        for (key, entry) in targets.iter().filter(|(_, entry)| entry.marked) {
            match key.resolve() {
                Some(target) => {
                    for value in &entry.values {
                        f(&target, value);
                    }
                }
                None => dead.push(key.clone()),
            }
        }
    }

    /// Remove every entry queued as dead during iteration.
    pub fn purge_dead(&mut self) {
        for key in self.dead.drain(..) {
            self.targets.remove(&key);
        }
    }

    /// Remove the given targets outright, dead or alive.
    pub fn remove_targets(&mut self, keys: impl IntoIterator<Item = WeakHandle>) {
        for key in keys {
            self.targets.remove(&key);
        }
    }

    /// Drop every entry and any pending dead queue.
    pub fn clear(&mut self) {
        self.targets.clear();
        self.dead.clear();
    }
}

impl<V: PartialEq> Default for TargetMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for TargetMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetMap")
            .field("targets", &self.targets.len())
            .field("pending_dead", &self.dead.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
