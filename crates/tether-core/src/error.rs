#![forbid(unsafe_code)]

//! Error taxonomy for tracker operations.
//!
//! Every variant is a caller logic bug surfaced synchronously at the call
//! site; nothing here is retried or swallowed. A dead weak handle is never an
//! error — it is the expected terminal state of a handle and is handled by
//! silent removal during a sweep.

/// Result alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors returned by [`DependencyTracker`](crate::DependencyTracker)
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    /// The holder passed to `add_dependency` is itself a
    /// [`WeakHandle`](crate::WeakHandle). A handle cannot be kept alive by
    /// the tracker without creating a nonsensical chain of watchers.
    HolderIsHandle,
    /// The dependency refers to the holder itself, which would make the
    /// holder keep itself alive forever.
    SelfDependency,
    /// `release` was called for a holder that has no registry entry.
    HolderNotRegistered,
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HolderIsHandle => write!(f, "holder cannot be a WeakHandle"),
            Self::SelfDependency => {
                write!(f, "a dependency cannot be registered as its own holder")
            }
            Self::HolderNotRegistered => write!(f, "Key was not found!"),
        }
    }
}

impl std::error::Error for TrackerError {}
