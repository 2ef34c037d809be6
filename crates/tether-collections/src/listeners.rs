#![forbid(unsafe_code)]

//! Deduplicated weak listener registry with reentrancy-safe notification.
//!
//! # Design
//!
//! Listeners are stored as [`Weak`] references in buckets keyed by the frozen
//! identity hash of their allocation ([`tether_core::identity_hash`]), so
//! membership checks and removal scan only the same-hash bucket instead of
//! the whole set.
//!
//! [`notify_each`](ListenerSet::notify_each) snapshots the live listeners
//! under the lock, dispatches the visitor with the lock released, and purges
//! entries found dead only after the full iteration completes. A visitor may
//! therefore add or remove listeners — including itself — without corrupting
//! the walk; listeners added mid-notification are not visited until the next
//! pass.
//!
//! # Invariants
//!
//! 1. At most one entry per distinct listener allocation.
//! 2. `len()` counts stored entries, live or not, until a purge runs.
//! 3. The structure being iterated is never mutated during dispatch.

use std::sync::{Arc, Mutex, Weak};

use ahash::AHashMap;
use tracing::trace;

use tether_core::identity_hash;

struct Buckets<L: ?Sized> {
    by_hash: AHashMap<u64, Vec<Weak<L>>>,
    len: usize,
}

/// A deduplicated collection of weak listener references.
///
/// `L` is typically a trait object (`ListenerSet<dyn MyListener>`); any
/// shared type works. The set never keeps a listener alive.
pub struct ListenerSet<L: ?Sized> {
    inner: Mutex<Buckets<L>>,
}

impl<L: ?Sized> ListenerSet<L> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Buckets {
                by_hash: AHashMap::new(),
                len: 0,
            }),
        }
    }

    /// Number of stored entries. Dead entries count until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a listener; silently does nothing if it is already present.
    pub fn add(&self, listener: &Arc<L>) {
        let hash = identity_hash(listener);
        let address = Arc::as_ptr(listener).cast::<()>();

        let mut inner = self.inner.lock().unwrap();
        let Buckets { by_hash, len } = &mut *inner;

        let bucket = by_hash.entry(hash).or_default();
        if bucket
            .iter()
            .any(|entry| entry.as_ptr().cast::<()>() == address)
        {
            return;
        }

        bucket.push(Arc::downgrade(listener));
        *len += 1;
        trace!(listeners = *len, "listener added");
    }

    /// Whether a listener is currently stored.
    #[must_use]
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        let hash = identity_hash(listener);
        let address = Arc::as_ptr(listener).cast::<()>();

        let inner = self.inner.lock().unwrap();
        inner
            .by_hash
            .get(&hash)
            .is_some_and(|bucket| {
                bucket
                    .iter()
                    .any(|entry| entry.as_ptr().cast::<()>() == address)
            })
    }

    /// Remove a listener; silently does nothing if it is absent.
    pub fn remove(&self, listener: &Arc<L>) {
        let hash = identity_hash(listener);
        let address = Arc::as_ptr(listener).cast::<()>();

        let mut inner = self.inner.lock().unwrap();
        let Buckets { by_hash, len } = &mut *inner;

        let Some(bucket) = by_hash.get_mut(&hash) else {
            return;
        };
        let Some(position) = bucket
            .iter()
            .position(|entry| entry.as_ptr().cast::<()>() == address)
        else {
            return;
        };

        bucket.swap_remove(position);
        *len -= 1;
        if bucket.is_empty() {
            by_hash.remove(&hash);
        }
        trace!(listeners = *len, "listener removed");
    }

    /// Visit every live listener.
    ///
    /// The candidate set is snapshotted before dispatch, so the visitor may
    /// add or remove listeners (reentrantly, on this same set) without
    /// affecting the current pass. Entries found dead are purged after the
    /// iteration completes.
    pub fn notify_each(&self, mut visitor: impl FnMut(&Arc<L>)) {
        let (live, saw_dead) = {
            let inner = self.inner.lock().unwrap();
            let mut live = Vec::with_capacity(inner.len);
            let mut saw_dead = false;
            for bucket in inner.by_hash.values() {
                for entry in bucket {
                    match entry.upgrade() {
                        Some(listener) => live.push(listener),
                        None => saw_dead = true,
                    }
                }
            }
            (live, saw_dead)
        };

        for listener in &live {
            visitor(listener);
        }

        if saw_dead {
            self.purge_dead();
        }
    }

    /// Drop every entry whose listener has died.
    pub fn purge_dead(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Buckets { by_hash, len } = &mut *inner;
        let before = *len;

        by_hash.retain(|_, bucket| {
            bucket.retain(|entry| entry.strong_count() > 0);
            !bucket.is_empty()
        });
        *len = by_hash.values().map(Vec::len).sum();

        let purged = before - *len;
        if purged > 0 {
            trace!(purged, remaining = *len, "purged dead listeners");
        }
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
