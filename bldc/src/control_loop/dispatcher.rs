use scopeguard::defer;

use crate::axis::{AuxOutput, AxisCallbacks, ControlLoop};
use crate::current_sensing::{PhaseCurrents, SampleCollector};
use crate::fault::{Fault, FaultSink};
use crate::peripherals::{PhaseCounter, PwmStage};
use crate::timestamp::Timestamp;
use crate::util::spin_until;

use super::{IrqStats, TimingCore};

/// What the dispatcher touches besides [`TimingCore`].
pub struct DispatchHardware<'a> {
    pub collector: SampleCollector<'a>,
    pub stages: [&'a dyn PwmStage; 2],
    /// Counter C, for instrumentation.
    pub tick_counter: &'a dyn PhaseCounter,
    pub axes: [&'a dyn FaultSink; 2],
}

/// The external control law.
pub struct ControlLaw<'a> {
    pub axes: [&'a mut dyn AxisCallbacks; 2],
    pub control_loop: &'a mut dyn ControlLoop,
    pub aux: &'a mut dyn AuxOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Entry snapshot.
    pub timestamp: Timestamp,
    /// OR of the codes of every fault raised during this period.
    pub faults: u32,
    /// Failed polls before the DC-calibration batch completed, `None` on timeout.
    pub dc_calib_spins: Option<u32>,
}

impl DispatchReport {
    pub fn has(&self, fault: Fault) -> bool {
        self.faults & fault.code() != 0
    }
}

impl TimingCore {
    /// Body of the low-priority dispatcher interrupt. Returns `None` if no dispatch was pending.
    pub fn dispatch(&self, hw: &DispatchHardware, law: &mut ControlLaw) -> Option<DispatchReport> {
        if !self.pending.take() {
            return None;
        }
        IrqStats::bump(&self.stats.dispatches);

        let task_timer = &self.task_timer;
        defer! {
            task_timer.finish_period();
        }

        let timestamp = self.timestamp.now();
        let quantum = self.config.quantum();
        let axis0_offset = self.config.axis0_offset;
        let mut faults = 0;
        let mut dc_calib_spins = None;
        let raise = |faults: &mut u32, fault: Fault| {
            *faults |= fault.code();
            self.report(hw.axes, fault);
        };

        let mut currents = match hw.collector.fetch_and_reset() {
            Some(samples) => {
                law.control_loop.vbus_sense_cb(samples.vbus_raw);
                samples.currents
            }
            None => {
                raise(&mut faults, Fault::BadTiming);
                [None, None]
            }
        };

        // With the bridge off the low side never conducts, so there is nothing to measure.
        for (current, stage) in currents.iter_mut().zip(hw.stages) {
            if !stage.is_switching() {
                *current = Some(PhaseCurrents::ZERO);
            }
        }

        law.axes[0].current_meas_cb(timestamp - axis0_offset, currents[0]);
        law.axes[1].current_meas_cb(timestamp, currents[1]);

        law.control_loop.control_loop_cb(timestamp);

        // Both converters should have fired again by now.
        let phase_b = hw.collector.phase_b;
        let waited = task_timer.measure(hw.tick_counter, || {
            spin_until(self.config.dc_calib_wait_limit, || phase_b.flags().regular)
        });
        let calib_currents = match waited {
            Ok(spins) => {
                dc_calib_spins = Some(spins);
                match hw.collector.fetch_and_reset() {
                    Some(samples) => {
                        law.control_loop.vbus_sense_cb(samples.vbus_raw);
                        samples.currents
                    }
                    None => {
                        raise(&mut faults, Fault::BadTiming);
                        [None, None]
                    }
                }
            }
            Err(_) => {
                raise(&mut faults, Fault::BadTiming);
                [None, None]
            }
        };

        let calib_at = timestamp + quantum;
        law.axes[0].dc_calib_cb(calib_at - axis0_offset, calib_currents[0]);
        law.axes[1].dc_calib_cb(calib_at, calib_currents[1]);

        let actuation_at = timestamp.plus_quanta(self.config.actuation_lead, quantum);
        law.axes[0].pwm_update_cb(actuation_at - axis0_offset);
        law.axes[1].pwm_update_cb(actuation_at);

        // Not latched on an update event; takes effect immediately.
        law.aux.update(actuation_at - axis0_offset);

        // Exactly one update event should have preempted us.
        if self.timestamp.now() != calib_at {
            raise(&mut faults, Fault::ControlDeadlineMissed);
        }

        Some(DispatchReport {
            timestamp,
            faults,
            dc_calib_spins,
        })
    }
}
