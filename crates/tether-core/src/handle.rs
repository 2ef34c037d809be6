#![forbid(unsafe_code)]

//! Frozen-hash weak handles: non-owning references that stay usable as map
//! keys after their referent is gone.
//!
//! # Design
//!
//! A [`WeakHandle`] wraps a type-erased [`Weak`] plus a hash captured once at
//! construction from the referent's allocation address. Because every handle
//! holds a weak count, the allocation is pinned (its address cannot be
//! recycled) for as long as any handle to it exists. That gives two
//! properties hash-keyed containers need:
//!
//! 1. `Hash` emits the frozen value forever, so an entry stays in the same
//!    bucket after its referent is dropped.
//! 2. `Eq` is allocation identity, so a dead entry can still be found and
//!    removed by direct key match.
//!
//! # Invariants
//!
//! 1. `frozen_hash()` never changes over the life of a handle or its clones.
//! 2. Two handles compare equal iff they refer to the same allocation,
//!    regardless of whether the referent is still alive.
//! 3. Equal handles always have equal hashes (equality implies same
//!    allocation implies same frozen hash).

use std::any::Any;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Arc, LazyLock, Weak};

use ahash::RandomState;

/// Type-erased shared object suitable for weak tracking.
pub type AnyObject = dyn Any + Send + Sync;

/// One hasher state for the whole process, so every identity hash computed
/// for a given allocation agrees with every handle frozen from it.
static IDENTITY_STATE: LazyLock<RandomState> = LazyLock::new(RandomState::new);

fn hash_addr(addr: *const ()) -> u64 {
    IDENTITY_STATE.hash_one(addr as usize)
}

/// Identity hash of an allocation, as frozen into any [`WeakHandle`] created
/// from it. Useful for bucket indexes that key weak entries by identity
/// without going through a handle.
pub fn identity_hash<T: ?Sized>(target: &Arc<T>) -> u64 {
    hash_addr(Arc::as_ptr(target).cast::<()>())
}

/// An opaque, hashably-stable reference that does not keep its target alive.
///
/// Cloning a handle produces another handle to the same allocation; clones
/// compare equal and hash identically.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tether_core::WeakHandle;
///
/// let value = Arc::new(String::from("tracked"));
/// let handle = WeakHandle::new(&value);
/// let hash_while_alive = handle.frozen_hash();
///
/// drop(value);
///
/// assert!(!handle.is_alive());
/// assert_eq!(handle.frozen_hash(), hash_while_alive);
/// ```
#[derive(Clone)]
pub struct WeakHandle {
    target: Weak<AnyObject>,
    frozen_hash: u64,
}

impl WeakHandle {
    /// Create a handle to `target` without extending its lifetime.
    pub fn new<T: Any + Send + Sync>(target: &Arc<T>) -> Self {
        let frozen_hash = identity_hash(target);
        let erased: Arc<AnyObject> = target.clone();
        let target: Weak<AnyObject> = Arc::downgrade(&erased);
        Self {
            target,
            frozen_hash,
        }
    }

    /// Create a handle from an already type-erased object.
    pub fn from_any(target: &Arc<AnyObject>) -> Self {
        Self {
            target: Arc::downgrade(target),
            frozen_hash: identity_hash(target),
        }
    }

    /// Upgrade to the live referent, or `None` once it has been dropped.
    #[must_use]
    pub fn resolve(&self) -> Option<Arc<AnyObject>> {
        self.target.upgrade()
    }

    /// Upgrade and downcast to a concrete type in one step.
    ///
    /// Returns `None` when the referent is gone *or* is not a `T`.
    #[must_use]
    pub fn resolve_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve().and_then(|object| object.downcast::<T>().ok())
    }

    /// Whether the referent is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// The hash captured at construction. Never recomputed, valid after the
    /// referent dies.
    #[must_use]
    pub fn frozen_hash(&self) -> u64 {
        self.frozen_hash
    }

    /// Whether two handles refer to the same allocation. This is exactly the
    /// `PartialEq` relation, exposed by name for call sites where `==` would
    /// read as value equality.
    #[must_use]
    pub fn ptr_eq(&self, other: &WeakHandle) -> bool {
        self.data_ptr() == other.data_ptr()
    }

    /// Thin address of the referent's allocation. Stable while any handle to
    /// the allocation exists.
    pub(crate) fn data_ptr(&self) -> *const () {
        self.target.as_ptr().cast::<()>()
    }
}

impl PartialEq for WeakHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for WeakHandle {}

impl Hash for WeakHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.frozen_hash.hash(state);
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("alive", &self.is_alive())
            .field("frozen_hash", &self.frozen_hash)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
