use std::sync::atomic::{AtomicBool, Ordering};

/// At-most-one execution gate. Callers that lose the race are rejected,
/// not queued.
#[derive(Debug, Default)]
pub struct SingleFlight {
    active: AtomicBool,
}

/// Marks the gate active until dropped, including during unwinding.
#[derive(Debug)]
pub struct SingleFlightGuard<'a> {
    active: &'a AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard if no other holder exists.
    pub fn try_acquire(&self) -> Option<SingleFlightGuard<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SingleFlightGuard {
                active: &self.active,
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
