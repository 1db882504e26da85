use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// One-winner drain coordination.
///
/// Exactly one thread wins [`DrainGate::try_begin`]. Disk readers park in
/// [`DrainGate::wait_idle`] until the winner calls [`DrainGate::finish`].
#[derive(Debug, Default)]
pub(crate) struct DrainGate {
    draining: AtomicBool,
    started: AtomicU64,
    lock: Mutex<()>,
    idle: Condvar,
}

impl DrainGate {
    /// Claim the gate. Returns `false` when another drain is running.
    pub(crate) fn try_begin(&self) -> bool {
        let won = self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        won
    }

    /// Release the gate and wake every parked reader.
    pub(crate) fn finish(&self) {
        let _guard = self.lock.lock();
        self.draining.store(false, Ordering::SeqCst);
        self.idle.notify_all();
    }

    /// Block until no drain is running.
    pub(crate) fn wait_idle(&self) {
        let mut guard = self.lock.lock();
        while self.draining.load(Ordering::SeqCst) {
            self.idle.wait(&mut guard);
        }
    }

    /// Snapshot used to detect a drain overlapping a registration.
    pub(crate) fn epoch(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the map is unchanged by drains since `epoch` was taken.
    pub(crate) fn is_stable_since(&self, epoch: u64) -> bool {
        !self.draining.load(Ordering::SeqCst) && self.epoch() == epoch
    }
}
