//! Simulated timing fabric for exercising the sampling loop on the host.
//!
//! Every simulated peripheral uses interior mutability behind `&self`, like the registers it
//! stands in for. Preemption of the dispatcher by the update handler is modelled by
//! [`RecordingLoop`] calling back into the rig from inside `control_loop_cb`.

use std::cell::Cell;

use dual_bldc::axis::{AuxOutput, AxisCallbacks, ControlLoop, Sampler};
use dual_bldc::config::TimingConfig;
use dual_bldc::control_loop::{
    ControlLaw, DispatchHardware, DispatchReport, TimingCore, UpdateHardware, UpdateOutcome,
};
use dual_bldc::current_sensing::{PhaseCurrents, SampleCollector, ShuntAmplifier};
use dual_bldc::fault::AxisFaultState;
use dual_bldc::peripherals::{
    ConversionFlags, ConverterUnit, Direction, GateDriver, PhaseCounter, PwmStage,
    SoftwareTrigger,
};
use dual_bldc::phase_clock::{PhaseClocks, Seed, StartError};
use dual_bldc::timestamp::Timestamp;

pub struct SimCounter {
    period: u32,
    center_aligned: bool,
    count: Cell<u32>,
    direction: Cell<Direction>,
    running: Cell<bool>,
    update_pending: Cell<bool>,
    update_irq: Cell<bool>,
    stuck: Cell<bool>,
}

impl SimCounter {
    fn new(period: u32, center_aligned: bool) -> Self {
        SimCounter {
            period,
            center_aligned,
            count: Cell::new(0),
            direction: Cell::new(Direction::Up),
            running: Cell::new(false),
            update_pending: Cell::new(true),
            update_irq: Cell::new(false),
            stuck: Cell::new(false),
        }
    }

    pub fn center_aligned(period: u32) -> Self {
        Self::new(period, true)
    }

    pub fn edge_aligned(period: u32) -> Self {
        Self::new(period, false)
    }

    /// Ignore `resume()` from now on.
    pub fn jam(&self) {
        self.stuck.set(true);
    }

    pub fn update_irq_enabled(&self) -> bool {
        self.update_irq.get()
    }

    pub fn update_pending(&self) -> bool {
        self.update_pending.get()
    }

    /// Position along the triangle (center-aligned) or the count (edge-aligned).
    pub fn position(&self) -> u32 {
        if self.center_aligned {
            Seed {
                count: self.count.get(),
                direction: self.direction.get(),
            }
            .triangle_position(self.period)
        } else {
            self.count.get()
        }
    }

    pub fn advance(&self, ticks: u32) {
        if !self.running.get() {
            return;
        }
        if self.center_aligned {
            let seed = Seed::on_triangle(self.position() + ticks, self.period);
            self.count.set(seed.count);
            self.direction.set(seed.direction);
        } else {
            self.count.set((self.count.get() + ticks) % (self.period + 1));
        }
        self.update_pending.set(true);
    }
}

impl PhaseCounter for SimCounter {
    fn period(&self) -> u32 {
        self.period
    }

    fn halt(&self) {
        self.running.set(false);
    }

    fn seed(&self, count: u32, direction: Direction) {
        assert!(!self.running.get(), "seeded while running");
        self.count.set(count);
        if self.center_aligned {
            self.direction.set(direction);
        }
    }

    fn resume(&self) {
        if !self.stuck.get() {
            self.running.set(true);
        }
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn count(&self) -> u32 {
        self.count.get()
    }

    fn direction(&self) -> Direction {
        self.direction.get()
    }

    fn acknowledge_update(&self) {
        self.update_pending.set(false);
    }

    fn enable_update_interrupt(&self) {
        self.update_irq.set(true);
    }
}

/// One converter. A batch completes on every simulated update event while triggers are on.
pub struct SimConverter {
    triggers: Cell<bool>,
    flags: Cell<ConversionFlags>,
    injected: Cell<u16>,
    regular: Cell<u16>,
    next_injected: Cell<u16>,
    next_regular: Cell<u16>,
    stalled: Cell<bool>,
}

impl SimConverter {
    pub fn new(code: u16) -> Self {
        SimConverter {
            triggers: Cell::new(false),
            flags: Cell::new(ConversionFlags::ALL),
            injected: Cell::new(0),
            regular: Cell::new(0),
            next_injected: Cell::new(code),
            next_regular: Cell::new(code),
            stalled: Cell::new(false),
        }
    }

    pub fn set_codes(&self, injected: u16, regular: u16) {
        self.next_injected.set(injected);
        self.next_regular.set(regular);
    }

    pub fn stall(&self, stalled: bool) {
        self.stalled.set(stalled);
    }

    pub fn triggers_enabled(&self) -> bool {
        self.triggers.get()
    }

    pub fn raw_flags(&self) -> ConversionFlags {
        self.flags.get()
    }

    pub fn complete_batch(&self) {
        if self.stalled.get() || !self.triggers.get() {
            return;
        }
        let previous = self.flags.get();
        self.injected.set(self.next_injected.get());
        self.regular.set(self.next_regular.get());
        self.flags.set(ConversionFlags {
            injected: true,
            regular: true,
            overrun: previous.overrun || previous.regular,
        });
    }
}

impl ConverterUnit for SimConverter {
    fn set_triggers(&self, enabled: bool) {
        self.triggers.set(enabled);
    }

    fn flags(&self) -> ConversionFlags {
        self.flags.get()
    }

    fn injected_result(&self) -> u16 {
        self.injected.get()
    }

    fn regular_result(&self) -> u16 {
        self.regular.get()
    }

    fn clear_flags(&self, flags: ConversionFlags) {
        let current = self.flags.get();
        self.flags.set(ConversionFlags {
            injected: current.injected && !flags.injected,
            regular: current.regular && !flags.regular,
            overrun: current.overrun && !flags.overrun,
        });
    }
}

pub struct SimGate {
    pub ready: Cell<bool>,
}

impl GateDriver for SimGate {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }
}

pub struct SimStage {
    pub switching: Cell<bool>,
    pub duty: Cell<Option<u32>>,
}

impl PwmStage for SimStage {
    fn is_switching(&self) -> bool {
        self.switching.get()
    }

    fn stage_duty(&self, compare: u32) {
        self.duty.set(Some(compare));
    }
}

#[derive(Default)]
pub struct SimTrigger {
    pub pends: Cell<u32>,
}

impl SoftwareTrigger for SimTrigger {
    fn trigger(&self) {
        self.pends.set(self.pends.get() + 1);
    }
}

#[derive(Default)]
pub struct SimSampler {
    pub calls: Cell<u32>,
}

impl Sampler for SimSampler {
    fn sampling_cb(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

pub struct SimRig {
    pub core: TimingCore,
    /// A, B, C.
    pub counters: [SimCounter; 3],
    /// Bus voltage, phase B, phase C.
    pub units: [SimConverter; 3],
    pub gates: [SimGate; 2],
    pub stages: [SimStage; 2],
    pub trigger: SimTrigger,
    pub axes: [AxisFaultState; 2],
    pub sampler: SimSampler,
    pub calibration: ShuntAmplifier,
}

impl SimRig {
    pub fn new(config: TimingConfig) -> SimRig {
        let gate = || SimGate {
            ready: Cell::new(true),
        };
        let stage = || SimStage {
            switching: Cell::new(true),
            duty: Cell::new(None),
        };
        SimRig {
            core: TimingCore::new(config),
            counters: [
                SimCounter::center_aligned(config.period_clocks),
                SimCounter::center_aligned(config.period_clocks),
                SimCounter::edge_aligned(config.tick_counter_period() - 1),
            ],
            units: [
                SimConverter::new(1000),
                SimConverter::new(2048),
                SimConverter::new(2048),
            ],
            gates: [gate(), gate()],
            stages: [stage(), stage()],
            trigger: SimTrigger::default(),
            axes: [AxisFaultState::new(), AxisFaultState::new()],
            sampler: SimSampler::default(),
            calibration: ShuntAmplifier::DEFAULT,
        }
    }

    pub fn config(&self) -> &TimingConfig {
        self.core.config()
    }

    pub fn start(&self) -> Result<(), StartError> {
        self.start_at(Timestamp::ZERO)
    }

    /// Starts with the timestamp at `epoch` instead of zero.
    pub fn start_at(&self, epoch: Timestamp) -> Result<(), StartError> {
        let [a, b, c] = &self.counters;
        let [vbus, phase_b, phase_c] = &self.units;
        self.core.start_timers_at(
            &PhaseClocks { a, b, c },
            [vbus, phase_b, phase_c],
            epoch,
        )?;
        for axis in &self.axes {
            axis.arm();
        }
        Ok(())
    }

    /// Phase B and C codes per axis for the next conversion batches.
    pub fn set_codes(&self, axis0: (u16, u16), axis1: (u16, u16)) {
        self.units[1].set_codes(axis0.0, axis1.0);
        self.units[2].set_codes(axis0.1, axis1.1);
    }

    /// Moves the counters one quantum forward, completes a conversion batch and raises B's
    /// update event.
    pub fn update_event(&self) -> UpdateOutcome {
        let config = self.config();
        let quantum = config.quantum();
        self.counters[0].advance(quantum);
        self.counters[1].advance(quantum);
        self.counters[2].advance(quantum / config.tick_divider);
        for unit in &self.units {
            unit.complete_batch();
        }
        self.core.on_update_event(&self.update_hardware())
    }

    /// Raises B's update event again without moving time, as if the previous event had been
    /// serviced late and the one in between lost.
    pub fn repeated_update_event(&self) -> UpdateOutcome {
        self.core.on_update_event(&self.update_hardware())
    }

    pub fn update_hardware(&self) -> UpdateHardware<'_> {
        UpdateHardware {
            counter: &self.counters[1],
            stages: [&self.stages[0], &self.stages[1]],
            trigger: &self.trigger,
            axes: [&self.axes[0], &self.axes[1]],
            sampler: &self.sampler,
        }
    }

    pub fn dispatch_hardware(&self) -> DispatchHardware<'_> {
        DispatchHardware {
            collector: self.collector(),
            stages: [&self.stages[0], &self.stages[1]],
            tick_counter: &self.counters[2],
            axes: [&self.axes[0], &self.axes[1]],
        }
    }

    pub fn collector(&self) -> SampleCollector<'_> {
        SampleCollector {
            vbus: &self.units[0],
            phase_b: &self.units[1],
            phase_c: &self.units[2],
            gates: [&self.gates[0], &self.gates[1]],
            calibrations: [&self.calibration, &self.calibration],
        }
    }

    pub fn dispatch(&self, recorder: &mut Recorder) -> Option<DispatchReport> {
        self.core
            .dispatch(&self.dispatch_hardware(), &mut recorder.law())
    }

    /// Raises update events, running the dispatcher whenever one is requested, until
    /// `periods` dispatches have completed.
    pub fn run_periods(&self, periods: usize, recorder: &mut Recorder) -> Vec<DispatchReport> {
        let mut reports = Vec::with_capacity(periods);
        for _ in 0..4 * periods + 4 {
            if reports.len() == periods {
                break;
            }
            if let UpdateOutcome::Dispatch { .. } = self.update_event() {
                reports.extend(self.dispatch(recorder));
            }
        }
        reports
    }
}

#[derive(Default)]
pub struct RecordingAxis {
    pub current_meas: Vec<(Timestamp, Option<PhaseCurrents>)>,
    pub dc_calib: Vec<(Timestamp, Option<PhaseCurrents>)>,
    pub pwm_update: Vec<Timestamp>,
}

impl AxisCallbacks for RecordingAxis {
    fn current_meas_cb(&mut self, timestamp: Timestamp, current: Option<PhaseCurrents>) {
        self.current_meas.push((timestamp, current));
    }

    fn dc_calib_cb(&mut self, timestamp: Timestamp, current: Option<PhaseCurrents>) {
        self.dc_calib.push((timestamp, current));
    }

    fn pwm_update_cb(&mut self, timestamp: Timestamp) {
        self.pwm_update.push(timestamp);
    }
}

/// Control loop stand-in. Each call lets `preemptions` update events fire, which is how long
/// the control law "takes".
pub struct RecordingLoop<'r> {
    rig: &'r SimRig,
    pub preemptions: usize,
    pub timestamps: Vec<Timestamp>,
    pub vbus: Vec<u16>,
    pub preempted_by: Vec<UpdateOutcome>,
    /// Converter that stops converting as soon as the control law starts.
    pub stall_unit: Option<usize>,
}

impl ControlLoop for RecordingLoop<'_> {
    fn control_loop_cb(&mut self, timestamp: Timestamp) {
        self.timestamps.push(timestamp);
        if let Some(unit) = self.stall_unit {
            self.rig.units[unit].stall(true);
        }
        for _ in 0..self.preemptions {
            let outcome = self.rig.update_event();
            self.preempted_by.push(outcome);
        }
    }

    fn vbus_sense_cb(&mut self, raw: u16) {
        self.vbus.push(raw);
    }
}

#[derive(Default)]
pub struct RecordingAux {
    pub updates: Vec<Timestamp>,
}

impl AuxOutput for RecordingAux {
    fn update(&mut self, timestamp: Timestamp) {
        self.updates.push(timestamp);
    }
}

pub struct Recorder<'r> {
    pub axes: [RecordingAxis; 2],
    pub control: RecordingLoop<'r>,
    pub aux: RecordingAux,
}

impl<'r> Recorder<'r> {
    pub fn new(rig: &'r SimRig) -> Self {
        Recorder {
            axes: Default::default(),
            control: RecordingLoop {
                rig,
                preemptions: 1,
                timestamps: Vec::new(),
                vbus: Vec::new(),
                preempted_by: Vec::new(),
                stall_unit: None,
            },
            aux: RecordingAux::default(),
        }
    }

    pub fn law(&mut self) -> ControlLaw<'_> {
        let [axis0, axis1] = &mut self.axes;
        ControlLaw {
            axes: [axis0, axis1],
            control_loop: &mut self.control,
            aux: &mut self.aux,
        }
    }
}
