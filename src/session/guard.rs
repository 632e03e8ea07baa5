//! Single-flight busy guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// At most one [`FlightToken`] exists at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    /// Creates an idle guard.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes the token, or returns `None` if it is already held.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightToken {
                guard: Arc::clone(self),
            })
    }

    /// True while a token is held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the busy guard. Dropping it frees the guard.
#[derive(Debug)]
pub struct FlightToken {
    guard: Arc<SingleFlight>,
}

impl Drop for FlightToken {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
