#![forbid(unsafe_code)]

//! Lifetime tethering for objects whose ownership cannot follow scope rules.
//!
//! A *holder* must stay alive exactly as long as at least one of several
//! other objects (its *dependencies*) is alive — without the holder keeping
//! those dependencies alive in turn, and with the holder finding out when
//! they die. This crate provides the three pieces that make that work:
//!
//! - [`WeakHandle`]: a non-owning reference with a hash frozen at creation,
//!   usable as a stable key in hash structures even after its referent is
//!   reclaimed.
//! - [`DependencyTracker`]: the registry that holds each holder strongly,
//!   watches its dependencies weakly, and releases the holder once every
//!   dependency is gone.
//! - [`DependencyObserver`]: an optional capability a holder implements to be
//!   told which of its dependencies died during a sweep.
//!
//! The tracker is an explicit context object — construct one and share it;
//! there is no process-wide global. All operations are synchronous and
//! thread-safe behind a single internal lock.
//!
//! Logging goes through `tracing` (`debug!` for sweep results, `trace!` for
//! registration traffic); this crate never installs a subscriber.

pub mod error;
pub mod handle;
pub mod observer;
pub mod tracker;

pub use error::TrackerError;
pub use handle::{AnyObject, WeakHandle, identity_hash};
pub use observer::DependencyObserver;
pub use tracker::{DependencyTracker, Holder};
