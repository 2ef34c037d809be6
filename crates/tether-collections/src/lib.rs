#![forbid(unsafe_code)]

//! Weak collections for layers that resolve values against live objects.
//!
//! Both collections here share the design of
//! [`tether_core::WeakHandle`]: entries are found by allocation identity via
//! a hash frozen while the referent was alive, so dead entries stay locatable
//! and removable.
//!
//! - [`ListenerSet`]: a deduplicated registry of weak listener references
//!   with reentrancy-safe notification and deferred dead-entry purging.
//! - [`TargetMap`]: a weak-keyed map from target objects to caller-defined
//!   slot values, for associating auxiliary data with an object without
//!   extending its lifetime.

pub mod listeners;
pub mod target_map;

pub use listeners::ListenerSet;
pub use target_map::TargetMap;
