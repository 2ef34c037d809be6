//! End-to-end lifetime behavior of the dependency tracker.
//!
//! These tests exercise the contract from the outside: a holder handed to the
//! tracker must stay reachable exactly as long as one of its dependencies is,
//! and must become collectible once a sweep has seen every dependency dead.
//! Dropping the last `Arc` plays the role a forced garbage collection plays
//! on managed runtimes, which makes every scenario deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tether_core::{DependencyObserver, DependencyTracker, Holder, TrackerError, WeakHandle};

/// A holder type with observable identity for liveness assertions.
struct Probe;

fn probe() -> (Arc<Probe>, Weak<Probe>) {
    let strong = Arc::new(Probe);
    let weak = Arc::downgrade(&strong);
    (strong, weak)
}

#[test]
fn live_dependency_keeps_holder_reachable() {
    let tracker = DependencyTracker::new();
    let dependency = Arc::new(String::from("dep"));
    let (holder, holder_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&dependency), Holder::plain(holder))
        .unwrap();

    // The only remaining strong reference to the holder is the tracker's.
    assert!(holder_weak.upgrade().is_some());
    assert!(dependency.len() > 0); // keep the dependency alive to this point
}

#[test]
fn two_holders_both_kept_alive() {
    let tracker = DependencyTracker::new();
    let first_dep = Arc::new(1u32);
    let second_dep = Arc::new(2u32);
    let (first_holder, first_weak) = probe();
    let (second_holder, second_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&first_dep), Holder::plain(first_holder))
        .unwrap();
    tracker
        .add_dependency(WeakHandle::new(&second_dep), Holder::plain(second_holder))
        .unwrap();

    assert!(first_weak.upgrade().is_some());
    assert!(second_weak.upgrade().is_some());
}

#[test]
fn sweep_releases_holder_once_dependency_dies() {
    let tracker = DependencyTracker::new();
    let dependency = Arc::new(String::from("dep"));
    let (holder, holder_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&dependency), Holder::plain(holder))
        .unwrap();

    drop(dependency);

    // The tracker has not looked yet; the holder is still pinned.
    assert!(holder_weak.upgrade().is_some());

    tracker.sweep();

    assert!(holder_weak.upgrade().is_none());
    assert_eq!(tracker.holder_count(), 0);
}

#[test]
fn surviving_dependency_keeps_holder_through_partial_death() {
    let tracker = DependencyTracker::new();
    let doomed = Arc::new(1u32);
    let survivor = Arc::new(2u32);
    let (holder, holder_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&doomed), Holder::plain(holder.clone()))
        .unwrap();
    tracker
        .add_dependency(WeakHandle::new(&survivor), Holder::plain(holder.clone()))
        .unwrap();
    drop(holder);

    drop(doomed);
    tracker.sweep();

    assert!(holder_weak.upgrade().is_some());
    let holder = holder_weak.upgrade().unwrap();
    assert_eq!(tracker.dependency_count(&holder), Some(1));
}

#[test]
fn full_sweep_reclaims_every_drained_holder() {
    let tracker = DependencyTracker::new();
    let first_dep = Arc::new(1u32);
    let second_dep = Arc::new(2u32);
    let (first_holder, first_weak) = probe();
    let (second_holder, second_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&first_dep), Holder::plain(first_holder))
        .unwrap();
    tracker
        .add_dependency(WeakHandle::new(&second_dep), Holder::plain(second_holder))
        .unwrap();

    drop(first_dep);
    drop(second_dep);
    tracker.sweep();

    assert!(first_weak.upgrade().is_none());
    assert!(second_weak.upgrade().is_none());
    assert_eq!(tracker.holder_count(), 0);
}

#[test]
fn targeted_release_leaves_other_holders_untouched() {
    let tracker = DependencyTracker::new();
    let first_dep = Arc::new(1u32);
    let second_dep = Arc::new(2u32);
    let (first_holder, first_weak) = probe();
    let (second_holder, second_weak) = probe();

    tracker
        .add_dependency(
            WeakHandle::new(&first_dep),
            Holder::plain(first_holder.clone()),
        )
        .unwrap();
    tracker
        .add_dependency(WeakHandle::new(&second_dep), Holder::plain(second_holder))
        .unwrap();

    tracker.release(&first_holder).unwrap();
    drop(first_holder);

    assert!(first_weak.upgrade().is_none());
    assert!(second_weak.upgrade().is_some());

    // Releasing again is the caller's bug and says so.
    let (stranger, _) = probe();
    assert_eq!(
        tracker.release(&stranger),
        Err(TrackerError::HolderNotRegistered)
    );
}

#[test]
fn registration_sweeps_stale_entries_and_notifies() {
    /// Counts callbacks so the sweep embedded in `add_dependency` is visible.
    #[derive(Default)]
    struct Counting {
        partial: Mutex<Vec<usize>>,
        full: AtomicUsize,
    }

    impl DependencyObserver for Counting {
        fn on_dependencies_dropped(&self, dead: &[WeakHandle]) {
            self.partial.lock().unwrap().push(dead.len());
        }

        fn on_all_dependencies_dropped(&self) {
            self.full.fetch_add(1, Ordering::SeqCst);
        }
    }

    let tracker = DependencyTracker::new();
    let observer = Arc::new(Counting::default());
    let doomed = Arc::new(1u32);
    let replacement = Arc::new(2u32);

    tracker
        .add_dependency(WeakHandle::new(&doomed), Holder::observing(observer.clone()))
        .unwrap();

    drop(doomed);

    // The next registration sweeps first: one dependency dead out of one,
    // but the holder gains a fresh entry from this same call.
    tracker
        .add_dependency(
            WeakHandle::new(&replacement),
            Holder::observing(observer.clone()),
        )
        .unwrap();

    assert_eq!(observer.full.load(Ordering::SeqCst), 1);
    assert!(observer.partial.lock().unwrap().is_empty());
    assert!(tracker.is_registered(&observer));
    assert_eq!(tracker.dependency_count(&observer), Some(1));
}

#[test]
fn partial_death_during_registration_notifies_with_batch() {
    #[derive(Default)]
    struct Collecting {
        batches: Mutex<Vec<Vec<WeakHandle>>>,
    }

    impl DependencyObserver for Collecting {
        fn on_dependencies_dropped(&self, dead: &[WeakHandle]) {
            self.batches.lock().unwrap().push(dead.to_vec());
        }

        fn on_all_dependencies_dropped(&self) {
            panic!("no full-death notification expected");
        }
    }

    let tracker = DependencyTracker::new();
    let observer = Arc::new(Collecting::default());
    let doomed = Arc::new(1u32);
    let doomed_handle = WeakHandle::new(&doomed);
    let survivor = Arc::new(2u32);
    let third = Arc::new(3u32);

    tracker
        .add_dependency(doomed_handle.clone(), Holder::observing(observer.clone()))
        .unwrap();
    tracker
        .add_dependency(
            WeakHandle::new(&survivor),
            Holder::observing(observer.clone()),
        )
        .unwrap();

    drop(doomed);

    // Registration of a third dependency runs the sweep that spots the death.
    tracker
        .add_dependency(WeakHandle::new(&third), Holder::observing(observer.clone()))
        .unwrap();

    let batches = observer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.len(), 1);
    assert!(batch.iter().any(|handle| handle.ptr_eq(&doomed_handle)));
}

#[test]
fn failed_registration_still_sweeps() {
    let tracker = DependencyTracker::new();
    let stale_dep = Arc::new(1u32);
    let (stale_holder, stale_weak) = probe();

    tracker
        .add_dependency(WeakHandle::new(&stale_dep), Holder::plain(stale_holder))
        .unwrap();
    drop(stale_dep);

    // This call is invalid (self-dependency), but the sweep it runs first
    // must still reclaim the stale entry.
    let victim = Arc::new(String::from("self"));
    let result = tracker.add_dependency(WeakHandle::new(&victim), Holder::plain(victim.clone()));

    assert_eq!(result, Err(TrackerError::SelfDependency));
    assert!(stale_weak.upgrade().is_none());
    assert_eq!(tracker.holder_count(), 0);
}
