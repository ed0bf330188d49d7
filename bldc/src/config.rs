//! Start-up timing configuration for the sampling fabric.
//!
//! Consumed once by `start_timers()`; nothing here is read back from hardware.

use static_assertions::const_assert;
use thiserror::Error;

use crate::timer::{solve_triangle, Solution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Input clock divider for counters A and B (1 = undivided).
    pub prescaler: u16,
    /// Reload value of counters A and B, i.e. counter ticks per half triangle.
    pub period_clocks: u32,
    /// Half-cycles folded into one update event minus one. Must be even so that consecutive
    /// update events land on alternating counting directions.
    pub repetition: u32,
    /// Initial count of counter A. Half of `period_clocks` puts A 90° away from B.
    pub axis0_offset: u32,
    /// Counter C runs this many times slower than A and B.
    pub tick_divider: u32,
    /// Quanta between dispatcher entry and the PWM compare values it computes taking effect.
    pub actuation_lead: u32,
    /// Upper bound on polls while waiting for the DC-calibration conversions.
    pub dc_calib_wait_limit: u32,
    /// Counter ticks that elapse between starting two counters back to back.
    pub start_skew: u32,
    /// Measure the DC-calibration wait on the next control period.
    pub instrumentation_armed: bool,
}

/// 24 kHz PWM from a 168 MHz timer clock, one dispatch per 125 us.
pub const DEFAULT_TIMING: TimingConfig = TimingConfig {
    prescaler: 1,
    period_clocks: 3500,
    repetition: 2,
    axis0_offset: 3500 / 2,
    tick_divider: 2,
    actuation_lead: 3,
    dc_calib_wait_limit: 20_000,
    start_skew: 0,
    instrumentation_armed: false,
};

const_assert!(DEFAULT_TIMING.repetition % 2 == 0);
const_assert!(DEFAULT_TIMING.axis0_offset < DEFAULT_TIMING.period_clocks);
const_assert!(DEFAULT_TIMING.control_period() % DEFAULT_TIMING.tick_divider == 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("counter period must be non-zero")]
    ZeroPeriod,
    #[error("repetition count {0} is odd; update events would not alternate direction")]
    OddRepetition(u32),
    #[error("axis 0 offset {offset} does not fit in counter period {period}")]
    OffsetOutOfRange { offset: u32, period: u32 },
    #[error("tick divider {divider} does not evenly divide the control period {period}")]
    TickDivider { divider: u32, period: u32 },
    #[error("timestamp quantum overflows 32 bits")]
    QuantumOverflow,
    #[error("no 16-bit counter setting reaches {0} Hz")]
    NoCounterSetting(u32),
}

impl TimingConfig {
    /// Timestamp ticks per update event.
    pub const fn quantum(&self) -> u32 {
        self.period_clocks * (self.repetition + 1)
    }

    /// Timestamp ticks per dispatch (two update events).
    pub const fn control_period(&self) -> u32 {
        2 * self.quantum()
    }

    /// Ticks of counter C (after the divider) per wrap. Its reload value is one less.
    pub const fn tick_counter_period(&self) -> u32 {
        self.control_period() / self.tick_divider
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_clocks == 0 || self.prescaler == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.repetition % 2 != 0 {
            return Err(ConfigError::OddRepetition(self.repetition));
        }
        if self.axis0_offset >= self.period_clocks {
            return Err(ConfigError::OffsetOutOfRange {
                offset: self.axis0_offset,
                period: self.period_clocks,
            });
        }
        let control_period = self
            .period_clocks
            .checked_mul(self.repetition + 1)
            .and_then(|quantum| quantum.checked_mul(2))
            .ok_or(ConfigError::QuantumOverflow)?;
        if self.tick_divider == 0 || control_period % self.tick_divider != 0 {
            return Err(ConfigError::TickDivider {
                divider: self.tick_divider,
                period: control_period,
            });
        }
        Ok(())
    }

    /// Derives counter settings for the requested PWM (triangle) frequency, keeping every other
    /// field from `self`. The axis 0 offset is rescaled to stay at 90°.
    pub fn with_pwm_frequency(self, clock_hz: u32, pwm_hz: u32) -> Result<TimingConfig, ConfigError> {
        let setting = match solve_triangle(clock_hz, pwm_hz as f32, 0.5) {
            Some(Solution::Exact(setting)) | Some(Solution::Approximate(setting)) => setting,
            None => return Err(ConfigError::NoCounterSetting(pwm_hz)),
        };
        let config = TimingConfig {
            prescaler: setting.prescaler,
            period_clocks: setting.period as u32,
            axis0_offset: setting.period as u32 / 2,
            ..self
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        DEFAULT_TIMING
    }
}
