use core::sync::atomic::{AtomicBool, Ordering};

use crate::peripherals::SoftwareTrigger;

/// Pending flag in front of the low-priority dispatcher interrupt.
///
/// The update handler requests, the dispatcher takes. A request that arrives while the previous
/// one is still pending coalesces with it: the dispatcher still runs once.
pub struct DeferredDispatch {
    pending: AtomicBool,
}

impl DeferredDispatch {
    pub const fn new() -> Self {
        DeferredDispatch {
            pending: AtomicBool::new(false),
        }
    }

    /// Returns true if the request coalesced with one that was still pending.
    pub fn request(&self, trigger: &dyn SoftwareTrigger) -> bool {
        let coalesced = self.pending.swap(true, Ordering::AcqRel);
        trigger.trigger();
        coalesced
    }

    /// Consumes the pending request, if any.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for DeferredDispatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct CountingTrigger(Cell<u32>);

    impl SoftwareTrigger for CountingTrigger {
        fn trigger(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn requests_coalesce_until_taken() {
        let dispatch = DeferredDispatch::new();
        let trigger = CountingTrigger(Cell::new(0));
        assert!(!dispatch.request(&trigger));
        assert!(dispatch.request(&trigger));
        assert_eq!(trigger.0.get(), 2);
        assert!(dispatch.take());
        assert!(!dispatch.take());
    }
}
