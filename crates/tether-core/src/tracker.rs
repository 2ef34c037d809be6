#![forbid(unsafe_code)]

//! The dependency registry: keeps holders alive while their weakly-watched
//! dependencies live, and reclaims them when the dependencies die.
//!
//! # Design
//!
//! [`DependencyTracker`] maps each holder (held *strongly* — that strong
//! reference is what keeps the holder alive) to the set of [`WeakHandle`]s
//! watching its dependencies. The tracker never holds a strong reference to a
//! dependency; only its death is interesting.
//!
//! A [`sweep`](DependencyTracker::sweep) resolves every handle, removes the
//! dead ones, and drops the whole entry — releasing the holder — once every
//! handle in it is dead. Holders registered through [`Holder::observing`]
//! are told what died.
//!
//! The tracker is an explicit context object: construct one per process (or
//! one per test) and share it; there is no hidden global.
//!
//! # Locking
//!
//! One mutex guards the registry. Every sweep-and-mutate sequence runs under
//! it, so no thread ever observes a half-swept registry. Observer callbacks
//! are dispatched *after* the lock is released, with their batches decided
//! under the lock — callbacks may therefore re-enter the tracker freely.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_core::{DependencyTracker, Holder, WeakHandle};
//!
//! let tracker = DependencyTracker::new();
//!
//! let dependency = Arc::new(String::from("watched"));
//! let holder = Arc::new(42u32);
//! let holder_weak = Arc::downgrade(&holder);
//!
//! tracker
//!     .add_dependency(WeakHandle::new(&dependency), Holder::plain(holder))
//!     .unwrap();
//!
//! // The tracker's strong reference keeps the holder reachable.
//! assert!(holder_weak.upgrade().is_some());
//!
//! // Once the dependency dies, a sweep releases the holder.
//! drop(dependency);
//! tracker.sweep();
//! assert!(holder_weak.upgrade().is_none());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::error::{Result, TrackerError};
use crate::handle::{AnyObject, WeakHandle};
use crate::observer::DependencyObserver;

// ─── Holder ──────────────────────────────────────────────────────────────────

/// A holder as the tracker stores it: either a plain object, or one that has
/// opted into death notification.
///
/// The variant is captured at first registration; re-registering the same
/// object does not change it.
pub enum Holder {
    /// Kept alive, never notified.
    Plain(Arc<AnyObject>),
    /// Kept alive and notified when dependencies die.
    Observing(Arc<dyn DependencyObserver>),
}

impl Holder {
    /// Wrap an object that does not care about notification.
    pub fn plain<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self::Plain(object)
    }

    /// Wrap an object that implements [`DependencyObserver`].
    pub fn observing<T: DependencyObserver + 'static>(object: Arc<T>) -> Self {
        Self::Observing(object)
    }

    fn data_ptr(&self) -> *const () {
        match self {
            Self::Plain(object) => Arc::as_ptr(object).cast::<()>(),
            Self::Observing(object) => Arc::as_ptr(object).cast::<()>(),
        }
    }

    fn is_handle(&self) -> bool {
        match self {
            Self::Plain(object) => object.as_ref().is::<WeakHandle>(),
            Self::Observing(_) => false,
        }
    }

    fn observer(&self) -> Option<Arc<dyn DependencyObserver>> {
        match self {
            Self::Plain(_) => None,
            Self::Observing(object) => Some(Arc::clone(object)),
        }
    }
}

impl fmt::Debug for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Plain(_) => "Plain",
            Self::Observing(_) => "Observing",
        };
        f.debug_tuple(variant).field(&self.data_ptr()).finish()
    }
}

// ─── DependencySet ───────────────────────────────────────────────────────────

/// Per-holder set of weak handles, unique by allocation identity.
///
/// Sets are small (typically one to a handful of dependencies), so a vector
/// with an identity scan beats a hash structure here and preserves insertion
/// order for the dead-batch report.
struct DependencySet {
    members: Vec<WeakHandle>,
}

impl DependencySet {
    fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Insert unless a handle to the same allocation is already present.
    /// Returns whether the handle was newly added.
    fn add(&mut self, handle: WeakHandle) -> bool {
        if self.members.iter().any(|member| member.ptr_eq(&handle)) {
            return false;
        }
        self.members.push(handle);
        true
    }

    /// Remove and return every dead handle in one scan, preserving insertion
    /// order within the returned batch.
    fn remove_dead(&mut self) -> Vec<WeakHandle> {
        let mut dead = Vec::new();
        self.members.retain(|handle| {
            if handle.is_alive() {
                true
            } else {
                dead.push(handle.clone());
                false
            }
        });
        dead
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

// ─── Registry internals ──────────────────────────────────────────────────────

struct Entry {
    holder: Holder,
    dependencies: DependencySet,
}

/// A notification decided during a sweep, dispatched after the lock drops.
enum Notice {
    SomeDead {
        observer: Arc<dyn DependencyObserver>,
        dead: Vec<WeakHandle>,
    },
    AllDead {
        observer: Arc<dyn DependencyObserver>,
    },
}

type Registry = AHashMap<usize, Entry>;

// ─── DependencyTracker ───────────────────────────────────────────────────────

/// Registry mapping holders to the weak handles watching their dependencies.
///
/// See the [module docs](self) for the full contract and an example.
pub struct DependencyTracker {
    registry: Mutex<Registry>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Register `dependency` as something that must keep `holder` alive.
    ///
    /// A full sweep runs first, in the same critical section, so the registry
    /// is consistent before it is mutated — stale entries are reclaimed (and
    /// their observers notified) even when this call then fails validation.
    ///
    /// Returns `Ok(true)` if this call newly registered the dependency and
    /// `Ok(false)` if a handle to the same object was already present for
    /// this holder (idempotent re-registration).
    ///
    /// # Errors
    ///
    /// - [`TrackerError::HolderIsHandle`] if `holder` wraps a [`WeakHandle`].
    /// - [`TrackerError::SelfDependency`] if `dependency` refers to `holder`
    ///   itself.
    pub fn add_dependency(&self, dependency: WeakHandle, holder: Holder) -> Result<bool> {
        let (result, notices, graveyard) = {
            let mut registry = self.registry.lock().unwrap();
            let (notices, graveyard) = Self::sweep_locked(&mut registry);

            let result = if holder.is_handle() {
                Err(TrackerError::HolderIsHandle)
            } else if dependency.data_ptr() == holder.data_ptr() {
                Err(TrackerError::SelfDependency)
            } else {
                let key = holder.data_ptr() as usize;
                let entry = registry.entry(key).or_insert_with(|| Entry {
                    holder,
                    dependencies: DependencySet::new(),
                });
                let newly_added = entry.dependencies.add(dependency);
                if newly_added {
                    trace!(
                        holder = key,
                        dependencies = entry.dependencies.len(),
                        "dependency registered"
                    );
                }
                Ok(newly_added)
            };

            (result, notices, graveyard)
        };

        Self::dispatch(notices);
        drop(graveyard);
        result
    }

    /// Sweep the whole registry: resolve every handle, drop the dead ones,
    /// and release holders whose dependencies are all gone.
    ///
    /// Observers hear about partial death via
    /// [`DependencyObserver::on_dependencies_dropped`] (once per holder per
    /// sweep, with the whole batch) and about full death via
    /// [`DependencyObserver::on_all_dependencies_dropped`]. Holders without
    /// the capability are cleaned up silently. A sweep never fails.
    pub fn sweep(&self) {
        let (notices, graveyard) = {
            let mut registry = self.registry.lock().unwrap();
            Self::sweep_locked(&mut registry)
        };

        Self::dispatch(notices);
        // Released holders (and anything their Drop impls do, including
        // calling back into this tracker) run outside the lock.
        drop(graveyard);
    }

    /// Remove `holder`'s entry unconditionally: no death check, no observer
    /// callback. This is the explicit "I am done with you" signal, distinct
    /// from sweep-triggered cleanup.
    ///
    /// # Errors
    ///
    /// [`TrackerError::HolderNotRegistered`] if `holder` has no entry —
    /// releasing something never registered is a caller logic bug, not a
    /// no-op.
    pub fn release<T: ?Sized>(&self, holder: &Arc<T>) -> Result<()> {
        let key = Arc::as_ptr(holder).cast::<()>() as usize;
        let removed = {
            let mut registry = self.registry.lock().unwrap();
            registry.remove(&key)
        };

        match removed {
            Some(entry) => {
                trace!(holder = key, "holder released");
                // Drop the strong holder reference outside the lock.
                drop(entry);
                Ok(())
            }
            None => Err(TrackerError::HolderNotRegistered),
        }
    }

    /// Number of holders currently registered.
    #[must_use]
    pub fn holder_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    /// Whether `holder` currently has an entry.
    #[must_use]
    pub fn is_registered<T: ?Sized>(&self, holder: &Arc<T>) -> bool {
        let key = Arc::as_ptr(holder).cast::<()>() as usize;
        self.registry.lock().unwrap().contains_key(&key)
    }

    /// Number of handles registered for `holder`, or `None` if it has no
    /// entry. Dead handles count until a sweep removes them.
    #[must_use]
    pub fn dependency_count<T: ?Sized>(&self, holder: &Arc<T>) -> Option<usize> {
        let key = Arc::as_ptr(holder).cast::<()>() as usize;
        self.registry
            .lock()
            .unwrap()
            .get(&key)
            .map(|entry| entry.dependencies.len())
    }

    /// Sweep pass over a locked registry. Returns the notifications to
    /// dispatch and the removed entries, both of which the caller must handle
    /// only after releasing the lock.
    fn sweep_locked(registry: &mut Registry) -> (Vec<Notice>, Vec<Entry>) {
        let mut notices = Vec::new();
        let mut drained_keys = Vec::new();
        let mut dead_total = 0usize;

        for (key, entry) in registry.iter_mut() {
            let dead = entry.dependencies.remove_dead();
            if dead.is_empty() {
                continue;
            }
            dead_total += dead.len();

            if entry.dependencies.is_empty() {
                drained_keys.push(*key);
                if let Some(observer) = entry.holder.observer() {
                    notices.push(Notice::AllDead { observer });
                }
            } else if let Some(observer) = entry.holder.observer() {
                notices.push(Notice::SomeDead { observer, dead });
            }
        }

        let mut graveyard = Vec::with_capacity(drained_keys.len());
        for key in &drained_keys {
            if let Some(entry) = registry.remove(key) {
                graveyard.push(entry);
            }
        }

        if dead_total > 0 {
            debug!(
                dead = dead_total,
                holders_released = drained_keys.len(),
                holders_remaining = registry.len(),
                "sweep reclaimed dead dependencies"
            );
        }

        (notices, graveyard)
    }

    fn dispatch(notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::SomeDead { observer, dead } => observer.on_dependencies_dropped(&dead),
                Notice::AllDead { observer } => observer.on_all_dependencies_dropped(),
            }
        }
    }
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("holders", &self.holder_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
