//! Contract between the sampling core and the control law.

use crate::current_sensing::PhaseCurrents;
use crate::timestamp::Timestamp;

/// Per-axis hooks, called from the dispatcher in a fixed order every control period.
///
/// `None` marks a measurement that is unavailable this period.
pub trait AxisCallbacks {
    fn current_meas_cb(&mut self, timestamp: Timestamp, current: Option<PhaseCurrents>);
    fn dc_calib_cb(&mut self, timestamp: Timestamp, current: Option<PhaseCurrents>);
    /// `timestamp` is when the compare values staged now will take effect.
    fn pwm_update_cb(&mut self, timestamp: Timestamp);
}

/// System-wide control law, run once per period between the two fetches.
pub trait ControlLoop {
    fn control_loop_cb(&mut self, timestamp: Timestamp);
    /// Raw bus voltage conversion, delivered on every successful fetch.
    fn vbus_sense_cb(&mut self, _raw: u16) {}
}

/// Output that is recomputed after the axes, e.g. a brake resistor.
pub trait AuxOutput {
    fn update(&mut self, timestamp: Timestamp);
}

/// Hook run from the update handler on every counting-up transition. Must be short.
pub trait Sampler {
    fn sampling_cb(&self);
}

impl AuxOutput for () {
    fn update(&mut self, _timestamp: Timestamp) {}
}

impl Sampler for () {
    fn sampling_cb(&self) {}
}
