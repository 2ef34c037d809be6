#![forbid(unsafe_code)]

//! Tether public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use tether_collections::{ListenerSet, TargetMap};
pub use tether_core::{
    AnyObject, DependencyObserver, DependencyTracker, Holder, TrackerError, WeakHandle,
    identity_hash,
};

pub mod prelude {
    pub use tether_collections as collections;
    pub use tether_core as core;
}
