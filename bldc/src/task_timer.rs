//! One-shot instrumentation of the DC-calibration wait, timed with counter C.
//!
//! Arming is a request from thread mode. The update handler latches it on the next counting-up
//! transition, the dispatcher measures during that period, and the request is consumed at the
//! end of the period whether or not the measurement completed.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::peripherals::PhaseCounter;

/// Counter C ticks. `start`/`end` are raw counts; `length` is corrected for a wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskTimes {
    pub start: u32,
    pub end: u32,
    pub length: u32,
    pub max_length: u32,
}

pub struct TaskTimer {
    armed: AtomicBool,
    enabled: AtomicBool,
    start: AtomicU32,
    end: AtomicU32,
    length: AtomicU32,
    max_length: AtomicU32,
    fresh: AtomicBool,
}

impl TaskTimer {
    pub const fn new() -> Self {
        TaskTimer {
            armed: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            start: AtomicU32::new(0),
            end: AtomicU32::new(0),
            length: AtomicU32::new(0),
            max_length: AtomicU32::new(0),
            fresh: AtomicBool::new(false),
        }
    }

    pub fn reset(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
        self.enabled.store(false, Ordering::Release);
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Update handler, counting-up transition.
    pub fn latch(&self) {
        self.enabled
            .store(self.armed.load(Ordering::Acquire), Ordering::Release);
    }

    /// Dispatcher exit. A request that was latched this period is consumed.
    pub fn finish_period(&self) {
        let was_enabled = self.enabled.swap(false, Ordering::AcqRel);
        if was_enabled {
            self.armed.store(false, Ordering::Release);
        }
    }

    /// Runs `f`, recording how long it took on `counter` if measurement is enabled this period.
    pub fn measure<R>(&self, counter: &dyn PhaseCounter, f: impl FnOnce() -> R) -> R {
        if !self.is_enabled() {
            return f();
        }
        let start = counter.count();
        let result = f();
        let end = counter.count();
        // Edge-aligned: the count runs 0..=period, so one wrap is period + 1 ticks.
        let wrap = counter.period() + 1;
        let length = (end + wrap - start) % wrap;
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
        self.length.store(length, Ordering::Relaxed);
        self.max_length.fetch_max(length, Ordering::Relaxed);
        self.fresh.store(true, Ordering::Release);
        result
    }

    pub fn times(&self) -> TaskTimes {
        TaskTimes {
            start: self.start.load(Ordering::Relaxed),
            end: self.end.load(Ordering::Relaxed),
            length: self.length.load(Ordering::Relaxed),
            max_length: self.max_length.load(Ordering::Relaxed),
        }
    }

    /// The latest measurement, once. Thread mode.
    pub fn take_result(&self) -> Option<TaskTimes> {
        self.fresh
            .swap(false, Ordering::AcqRel)
            .then(|| self.times())
    }
}

impl Default for TaskTimer {
    fn default() -> Self {
        Self::new()
    }
}
