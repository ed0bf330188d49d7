//! Interfaces the sampling core uses to reach the timing fabric.
//!
//! Every method takes `&self`: these model memory-mapped registers, which are shared between
//! the update handler and the dispatcher and are read/written volatilely. Register-level bit
//! manipulation stays behind these traits (see [`crate::board`] for the STM32F405 binding).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flipped(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// A center-aligned (triangle) up/down counter.
pub trait PhaseCounter {
    /// Reload value. Center-aligned, the counter climbs from 0 to `period` and back down;
    /// edge-aligned, it counts 0..=`period` and wraps after `period + 1` ticks.
    fn period(&self) -> u32;
    fn halt(&self);
    /// Loads a count and counting direction. Only valid while halted.
    fn seed(&self, count: u32, direction: Direction);
    fn resume(&self);
    fn is_running(&self) -> bool;
    fn count(&self) -> u32;
    fn direction(&self) -> Direction;
    /// Clears a pending update event flag.
    fn acknowledge_update(&self);
    fn enable_update_interrupt(&self);
}

/// The output side of a PWM counter.
pub trait PwmStage {
    /// Main output enable: whether the half bridges are actually being driven.
    fn is_switching(&self) -> bool;
    /// Stages the same compare value on all three phases. Takes effect at the next update.
    fn stage_duty(&self, compare: u32);
}

/// End-of-conversion status of a converter unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionFlags {
    pub injected: bool,
    pub regular: bool,
    pub overrun: bool,
}

impl ConversionFlags {
    pub const NONE: ConversionFlags = ConversionFlags {
        injected: false,
        regular: false,
        overrun: false,
    };
    pub const INJECTED: ConversionFlags = ConversionFlags {
        injected: true,
        ..Self::NONE
    };
    pub const REGULAR: ConversionFlags = ConversionFlags {
        regular: true,
        ..Self::NONE
    };
    pub const BOTH: ConversionFlags = ConversionFlags {
        injected: true,
        regular: true,
        overrun: false,
    };
    pub const ALL: ConversionFlags = ConversionFlags {
        injected: true,
        regular: true,
        overrun: true,
    };

    /// True if every flag set in `required` is also set in `self`.
    pub fn contains(&self, required: ConversionFlags) -> bool {
        (self.injected || !required.injected)
            && (self.regular || !required.regular)
            && (self.overrun || !required.overrun)
    }
}

/// One ADC with an injected and a regular result register.
pub trait ConverterUnit {
    /// Gates the external (timer) trigger. Masked while counters are being seeded.
    fn set_triggers(&self, enabled: bool);
    fn flags(&self) -> ConversionFlags;
    fn injected_result(&self) -> u16;
    fn regular_result(&self) -> u16;
    fn clear_flags(&self, flags: ConversionFlags);
}

pub trait GateDriver {
    fn is_ready(&self) -> bool;
}

/// Pends the low-priority interrupt that runs the control dispatcher.
pub trait SoftwareTrigger {
    fn trigger(&self);
}
