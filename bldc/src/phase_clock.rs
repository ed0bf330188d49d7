//! Phase-locked start of the three counters.
//!
//! A and B are center-aligned PWM counters a quarter triangle apart. C is an edge-aligned tick
//! counter whose reload coincides with A's lower update event; it only serves as a time base for
//! instrumentation.

use log::info;
use thiserror::Error;

use crate::config::{ConfigError, TimingConfig};
use crate::peripherals::{ConversionFlags, ConverterUnit, Direction, PhaseCounter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("counter {0} did not start")]
    CounterStalled(char),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub count: u32,
    pub direction: Direction,
}

impl Seed {
    /// The `(count, direction)` of a center-aligned counter `position` ticks into its triangle.
    /// At the apex the counter is already counting down.
    pub fn on_triangle(position: u32, period: u32) -> Seed {
        let position = position % (2 * period);
        if position < period {
            Seed {
                count: position,
                direction: Direction::Up,
            }
        } else {
            Seed {
                count: 2 * period - position,
                direction: Direction::Down,
            }
        }
    }

    /// Inverse of [`Seed::on_triangle`].
    pub fn triangle_position(&self, period: u32) -> u32 {
        match self.direction {
            Direction::Up => self.count,
            Direction::Down => (2 * period - self.count) % (2 * period),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialCounts {
    pub a: Seed,
    pub b: Seed,
    pub c: Seed,
}

impl InitialCounts {
    /// Counters are started in the order A, B, C, `start_skew` ticks apart. Later counters are
    /// pre-advanced by the time they start late.
    pub fn from_timing(config: &TimingConfig) -> InitialCounts {
        let period = config.period_clocks;
        let skew = config.start_skew;

        let a = Seed::on_triangle(config.axis0_offset, period);
        let b = Seed::on_triangle(skew, period);

        // A reaches the bottom of its first triangle 2·period - offset ticks after it starts. C
        // starts 2·skew after A and must wrap at that instant.
        let c_period = config.tick_counter_period() as i64;
        let until_wrap =
            (2 * period as i64 - config.axis0_offset as i64 - 2 * skew as i64)
                / config.tick_divider as i64;
        let c = Seed {
            count: (c_period - until_wrap).rem_euclid(c_period) as u32,
            direction: Direction::Up,
        };

        InitialCounts { a, b, c }
    }
}

pub struct PhaseClocks<'a> {
    pub a: &'a dyn PhaseCounter,
    pub b: &'a dyn PhaseCounter,
    pub c: &'a dyn PhaseCounter,
}

impl PhaseClocks<'_> {
    fn labeled(&self) -> [(char, &dyn PhaseCounter); 3] {
        [('A', self.a), ('B', self.b), ('C', self.c)]
    }
}

/// Seeds and starts all three counters back to back.
///
/// Converter triggers are masked for the duration so that the seeding itself does not start a
/// conversion. Once the counters are running, stale conversion flags are cleared and counter B's
/// update interrupt is enabled. If a counter fails to start the triggers stay masked and the
/// caller must not enter the control loop.
pub fn start_synchronously(
    clocks: &PhaseClocks,
    units: [&dyn ConverterUnit; 3],
    seeds: &InitialCounts,
) -> Result<(), StartError> {
    for unit in units {
        unit.set_triggers(false);
    }

    let seeded = [seeds.a, seeds.b, seeds.c];
    for ((_, counter), seed) in clocks.labeled().into_iter().zip(seeded) {
        counter.halt();
        counter.seed(seed.count, seed.direction);
    }
    for (_, counter) in clocks.labeled() {
        counter.resume();
    }
    if let Some((label, _)) = clocks
        .labeled()
        .into_iter()
        .find(|(_, counter)| !counter.is_running())
    {
        return Err(StartError::CounterStalled(label));
    }

    for unit in units {
        unit.set_triggers(true);
    }
    for unit in units {
        unit.clear_flags(ConversionFlags::ALL);
    }

    clocks.b.acknowledge_update();
    clocks.b.enable_update_interrupt();

    info!(
        "Counters started: A {:?}, B {:?}, C {:?}",
        seeds.a, seeds.b, seeds.c
    );
    Ok(())
}
