//! Conversion results to phase currents.
//!
//! Unit 1 converts the bus voltage on its injected channel. Units 2 and 3 convert phases B and C
//! of both axes: the injected result belongs to axis 0, the regular result to axis 1.

use crate::peripherals::{ConversionFlags, ConverterUnit, GateDriver};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseCurrents {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PhaseCurrents {
    pub const ZERO: PhaseCurrents = PhaseCurrents {
        a: 0.,
        b: 0.,
        c: 0.,
    };

    /// Phase A is not measured; Kirchhoff gives it from the other two.
    pub fn from_two_phases(b: f32, c: f32) -> PhaseCurrents {
        PhaseCurrents { a: -b - c, b, c }
    }
}

/// Maps a raw conversion code to amps, or rejects it.
pub trait CurrentCalibration {
    fn phase_current(&self, code: u16) -> Option<f32>;
}

/// Low-side shunt followed by a bidirectional amplifier biased at half the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShuntAmplifier {
    pub v_ref: f32,
    pub full_scale: u16,
    pub amplifier_gain: f32,
    pub shunt_conductance: f32,
    /// Codes below this are treated as a saturated amplifier.
    pub lower_bound: u16,
    /// Codes above this are treated as a saturated amplifier.
    pub upper_bound: u16,
}

impl ShuntAmplifier {
    /// 3.3 V reference, 12-bit converter, 40 V/V amplifier across a 500 µΩ shunt, ±1800 codes of
    /// usable swing around mid-scale.
    pub const DEFAULT: ShuntAmplifier = ShuntAmplifier {
        v_ref: 3.3,
        full_scale: 4096,
        amplifier_gain: 40.,
        shunt_conductance: 1. / 0.0005,
        lower_bound: 2048 - 1800,
        upper_bound: 2048 + 1800,
    };
}

impl Default for ShuntAmplifier {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl CurrentCalibration for ShuntAmplifier {
    fn phase_current(&self, code: u16) -> Option<f32> {
        if code < self.lower_bound || code > self.upper_bound {
            return None;
        }
        let amp_out_volts = code as f32 * self.v_ref / self.full_scale as f32;
        let shunt_volts = (amp_out_volts - self.v_ref / 2.) / self.amplifier_gain;
        Some(shunt_volts * self.shunt_conductance)
    }
}

/// Result of one successful fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSet {
    /// Per axis; `None` if the gate driver is not ready or a code was rejected.
    pub currents: [Option<PhaseCurrents>; 2],
    /// Unit 1 injected result.
    pub vbus_raw: u16,
}

pub struct SampleCollector<'a> {
    pub vbus: &'a dyn ConverterUnit,
    pub phase_b: &'a dyn ConverterUnit,
    pub phase_c: &'a dyn ConverterUnit,
    pub gates: [&'a dyn GateDriver; 2],
    pub calibrations: [&'a dyn CurrentCalibration; 2],
}

impl SampleCollector<'_> {
    pub fn is_ready(&self) -> bool {
        self.vbus.flags().contains(ConversionFlags::INJECTED)
            && self.phase_b.flags().contains(ConversionFlags::BOTH)
            && self.phase_c.flags().contains(ConversionFlags::BOTH)
    }

    /// Consumes a complete batch of conversions. Returns `None` without touching any unit if the
    /// batch is incomplete.
    pub fn fetch_and_reset(&self) -> Option<SampleSet> {
        if !self.is_ready() {
            return None;
        }

        let vbus_raw = self.vbus.injected_result();
        let axis0 = self.axis_currents(
            0,
            self.phase_b.injected_result(),
            self.phase_c.injected_result(),
        );
        let axis1 = self.axis_currents(
            1,
            self.phase_b.regular_result(),
            self.phase_c.regular_result(),
        );

        self.vbus.clear_flags(ConversionFlags::INJECTED);
        self.phase_b.clear_flags(ConversionFlags::ALL);
        self.phase_c.clear_flags(ConversionFlags::ALL);

        Some(SampleSet {
            currents: [axis0, axis1],
            vbus_raw,
        })
    }

    fn axis_currents(&self, axis: usize, code_b: u16, code_c: u16) -> Option<PhaseCurrents> {
        if !self.gates[axis].is_ready() {
            return None;
        }
        let calibration = self.calibrations[axis];
        let b = calibration.phase_current(code_b)?;
        let c = calibration.phase_current(code_c)?;
        Some(PhaseCurrents::from_two_phases(b, c))
    }
}
