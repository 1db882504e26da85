use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a run and its pools.
///
/// Workers check the flag between items; setting it never interrupts an
/// item that is already being handled.
///
/// # Examples
///
/// ```
/// use citylink_worker::StopSignal;
///
/// let signal = StopSignal::default();
/// let observer = signal.clone();
/// signal.stop();
/// assert!(observer.is_stopped());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Request that all holders stop taking new work.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
