#![forbid(unsafe_code)]

//! Optional capability for holders that want to hear about dependency death.

use crate::handle::WeakHandle;

/// Implemented by holders that want a callback when their dependencies die.
///
/// Holders opt in by registering through
/// [`Holder::observing`](crate::Holder::observing); holders registered as
/// plain objects receive no notification, but the cleanup still happens.
///
/// Callbacks are dispatched after the tracker's internal lock has been
/// released, so an implementation may call back into the tracker. Note that
/// by the time [`on_all_dependencies_dropped`] runs, the holder's entry is
/// already gone — a `release` of itself from inside the callback reports
/// [`HolderNotRegistered`](crate::TrackerError::HolderNotRegistered).
///
/// [`on_all_dependencies_dropped`]: DependencyObserver::on_all_dependencies_dropped
pub trait DependencyObserver: Send + Sync {
    /// Some, but not all, of this holder's dependencies died in one sweep
    /// pass. Called exactly once per sweep with the whole dead batch; the
    /// holder remains registered.
    fn on_dependencies_dropped(&self, dead: &[WeakHandle]);

    /// Every dependency of this holder died in one sweep pass. The holder's
    /// entry has been removed from the registry; the tracker no longer keeps
    /// it alive.
    fn on_all_dependencies_dropped(&self);
}
