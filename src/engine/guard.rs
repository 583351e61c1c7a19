use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight gate: at most one holder at a time.
#[derive(Debug, Default)]
pub struct RunGuard {
    held: AtomicBool,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic test-and-set. Returns true if the caller now holds the guard.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Safe to call when not held.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquire and get a permit that releases on drop, including during unwinding.
    pub fn try_permit(&self) -> Option<RunPermit<'_>> {
        self.try_acquire().then_some(RunPermit { guard: self })
    }
}

#[must_use = "dropping the permit releases the guard immediately"]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
