use crate::axis::Sampler;
use crate::deadline::Observation;
use crate::fault::{Fault, FaultSink};
use crate::peripherals::{Direction, PhaseCounter, PwmStage, SoftwareTrigger};

use super::{IrqStats, TimingCore};

/// What the update handler touches besides [`TimingCore`].
pub struct UpdateHardware<'a> {
    /// Counter B.
    pub counter: &'a dyn PhaseCounter,
    pub stages: [&'a dyn PwmStage; 2],
    pub trigger: &'a dyn SoftwareTrigger,
    pub axes: [&'a dyn FaultSink; 2],
    pub sampler: &'a dyn Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Same direction as the previous event. Both axes were disarmed; nothing else happened.
    Missed,
    /// Counting up: the dispatcher was requested.
    Dispatch { coalesced: bool },
    /// Counting down: neutral duty was staged on both outputs.
    Neutral,
}

impl TimingCore {
    /// Body of the counter B update interrupt.
    pub fn on_update_event(&self, hw: &UpdateHardware) -> UpdateOutcome {
        IrqStats::bump(&self.stats.update_events);
        hw.counter.acknowledge_update();

        // Counting up means B just turned around at the bottom of its triangle: the samples
        // taken there carry real current.
        let direction = hw.counter.direction();
        if self.deadline.observe(direction) == Observation::Missed {
            IrqStats::bump(&self.stats.missed_updates);
            self.report(hw.axes, Fault::TimerUpdateMissed);
            return UpdateOutcome::Missed;
        }

        self.timestamp.advance(self.config.quantum());

        match direction {
            Direction::Up => {
                self.task_timer.latch();
                hw.sampler.sampling_cb();
                let coalesced = self.pending.request(hw.trigger);
                if coalesced {
                    IrqStats::bump(&self.stats.coalesced_requests);
                }
                UpdateOutcome::Dispatch { coalesced }
            }
            Direction::Down => {
                // Replaced by the axes' next compare values if the dispatcher finishes in time.
                let neutral = self.config.period_clocks / 2;
                for stage in hw.stages {
                    stage.stage_duty(neutral);
                }
                UpdateOutcome::Neutral
            }
        }
    }
}
