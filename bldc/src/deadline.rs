//! Detects skipped update events from the counting direction of counter B.
//!
//! Update events are spaced an odd number of half-cycles apart, so in steady state every event
//! sees the opposite direction of the previous one. Seeing the same direction twice means an
//! event was lost (the handler was held off for a whole quantum).

use core::sync::atomic::{AtomicU8, Ordering};

use crate::peripherals::Direction;

const UNSYNCED: u8 = 0;
const LAST_UP: u8 = 1;
const LAST_DOWN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Genuine(Direction),
    Missed,
}

pub struct DeadlineMonitor {
    last: AtomicU8,
}

impl DeadlineMonitor {
    pub const fn new() -> Self {
        DeadlineMonitor {
            last: AtomicU8::new(UNSYNCED),
        }
    }

    pub fn reset(&self) {
        self.last.store(UNSYNCED, Ordering::Release);
    }

    /// Direction the next update event is expected to report, if synchronized.
    pub fn expected(&self) -> Option<Direction> {
        match self.last.load(Ordering::Acquire) {
            LAST_UP => Some(Direction::Down),
            LAST_DOWN => Some(Direction::Up),
            _ => None,
        }
    }

    /// Records `observed` and classifies it. The first observation after `reset` is always
    /// genuine. A missed observation still becomes the new reference.
    pub fn observe(&self, observed: Direction) -> Observation {
        let encoded = match observed {
            Direction::Up => LAST_UP,
            Direction::Down => LAST_DOWN,
        };
        let previous = self.last.swap(encoded, Ordering::AcqRel);
        if previous == encoded {
            Observation::Missed
        } else {
            Observation::Genuine(observed)
        }
    }
}

impl Default for DeadlineMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_reconciles() {
        let monitor = DeadlineMonitor::new();
        assert_eq!(monitor.expected(), None);
        assert_eq!(
            monitor.observe(Direction::Down),
            Observation::Genuine(Direction::Down)
        );
        assert_eq!(monitor.expected(), Some(Direction::Up));
    }

    #[test]
    fn repeated_direction_is_missed() {
        let monitor = DeadlineMonitor::new();
        monitor.observe(Direction::Up);
        assert_eq!(
            monitor.observe(Direction::Down),
            Observation::Genuine(Direction::Down)
        );
        assert_eq!(monitor.observe(Direction::Down), Observation::Missed);
        assert_eq!(
            monitor.observe(Direction::Up),
            Observation::Genuine(Direction::Up)
        );
    }

    #[test]
    fn reset_forgets_history() {
        let monitor = DeadlineMonitor::new();
        monitor.observe(Direction::Up);
        monitor.reset();
        assert_eq!(
            monitor.observe(Direction::Up),
            Observation::Genuine(Direction::Up)
        );
    }
}
