//! Prescaler/period search for center-aligned counters.
//!
//! A center-aligned counter with prescaler `p` and reload `n` completes one triangle (up and
//! back down) every `2·p·n` input clocks.

use num_traits::float::FloatCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSetting {
    pub prescaler: u16,
    pub period: u16,
}

impl CounterSetting {
    pub fn triangle_frequency(&self, clock_hz: u32) -> f32 {
        clock_hz as f32 / (2. * self.prescaler as f32 * self.period as f32)
    }

    pub fn info(&self, clock_hz: u32, desired_hz: f32) -> CounterInfo {
        let frequency = self.triangle_frequency(clock_hz);
        CounterInfo {
            frequency,
            dt: 1. / frequency,
            period_error_ns: (1. / frequency - 1. / desired_hz) * 1e9,
        }
    }
}

#[derive(Debug)]
pub struct CounterInfo {
    pub frequency: f32,
    pub dt: f32,
    pub period_error_ns: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solution {
    Exact(CounterSetting),
    Approximate(CounterSetting),
}

impl Solution {
    pub fn setting(&self) -> CounterSetting {
        match self {
            Self::Exact(x) => *x,
            Self::Approximate(x) => *x,
        }
    }
}

/// Finds the smallest prescaler whose triangle frequency hits `desired_hz` exactly, or is within
/// `tolerance` Hz of it. Returns `None` if no 16-bit setting gets that close.
pub fn solve_triangle(clock_hz: u32, desired_hz: f32, tolerance: f32) -> Option<Solution> {
    if desired_hz <= 0. {
        return None;
    }
    let mut best: Option<(f32, CounterSetting)> = None;
    for prescaler in 1..u16::MAX {
        let period =
            FloatCore::round(clock_hz as f32 / (2. * desired_hz * prescaler as f32)) as u32;
        if period == 0 {
            break;
        }
        if period >= 1 << 16 {
            continue;
        }
        let setting = CounterSetting {
            prescaler,
            period: period as u16,
        };
        let diff = FloatCore::abs(setting.triangle_frequency(clock_hz) - desired_hz);
        if diff == 0. {
            return Some(Solution::Exact(setting));
        }
        if best.map_or(true, |(closest, _)| diff < closest) {
            best = Some((diff, setting));
        }
        if diff < tolerance {
            break;
        }
    }
    match best {
        Some((diff, setting)) if diff < tolerance => Some(Solution::Approximate(setting)),
        _ => None,
    }
}
