use core::ops;
use core::sync::atomic::{AtomicU32, Ordering};

/// Counter ticks since `start_timers()` (plus its epoch), modulo 2³².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(pub u32);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Signed distance from `earlier` to `self`, correct across a wrap as long as the two are
    /// less than 2³¹ ticks apart.
    pub const fn since(self, earlier: Timestamp) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// `self + quanta × quantum`, wrapping.
    pub const fn plus_quanta(self, quanta: u32, quantum: u32) -> Timestamp {
        Timestamp(self.0.wrapping_add(quanta.wrapping_mul(quantum)))
    }
}

impl ops::Add<u32> for Timestamp {
    type Output = Timestamp;
    fn add(self, ticks: u32) -> Timestamp {
        Timestamp(self.0.wrapping_add(ticks))
    }
}

impl ops::Sub<u32> for Timestamp {
    type Output = Timestamp;
    fn sub(self, ticks: u32) -> Timestamp {
        Timestamp(self.0.wrapping_sub(ticks))
    }
}

/// Single-writer tick source advanced by the update handler.
pub struct TimestampGenerator {
    ticks: AtomicU32,
}

impl TimestampGenerator {
    pub const fn new() -> Self {
        TimestampGenerator {
            ticks: AtomicU32::new(0),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp(self.ticks.load(Ordering::Acquire))
    }

    /// Single writer: the update handler.
    pub fn advance(&self, quantum: u32) -> Timestamp {
        let next = self.ticks.load(Ordering::Relaxed).wrapping_add(quantum);
        self.ticks.store(next, Ordering::Release);
        Timestamp(next)
    }

    pub fn reset(&self, epoch: Timestamp) {
        self.ticks.store(epoch.0, Ordering::Release);
    }
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::new()
    }
}
