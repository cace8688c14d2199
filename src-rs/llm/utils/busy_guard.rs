use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a client busy for the lifetime of one request and resets the
/// cancel flag on entry. Dropping the guard clears the busy flag on every
/// exit path, including unwinding.
pub struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    cancel: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    pub fn new(busy: &'a AtomicBool, cancel: &'a AtomicBool) -> Self {
        busy.store(true, Ordering::Release);
        cancel.store(false, Ordering::Release);
        Self { busy, cancel }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
