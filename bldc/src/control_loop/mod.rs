//! The two interrupt-level halves of the control loop and the state they share.
//!
//! The update handler ([`TimingCore::on_update_event`]) runs at high priority on every counter B
//! update event. The dispatcher ([`TimingCore::dispatch`]) runs at low priority once per control
//! period. Everything they share lives in [`TimingCore`] and is either atomic or behind a
//! non-blocking lock, so a single `static` instance can be referenced from both handlers.

use core::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};

use crate::config::TimingConfig;
use crate::deadline::DeadlineMonitor;
use crate::fault::{Fault, FaultLog, FaultSink};
use crate::peripherals::ConverterUnit;
use crate::phase_clock::{self, InitialCounts, PhaseClocks, StartError};
use crate::task_timer::TaskTimer;
use crate::timestamp::{Timestamp, TimestampGenerator};

pub mod deferred;
pub mod dispatcher;
pub mod update;

pub use deferred::DeferredDispatch;
pub use dispatcher::{ControlLaw, DispatchHardware, DispatchReport};
pub use update::{UpdateHardware, UpdateOutcome};

pub const FAULT_LOG_DEPTH: usize = 16;

/// Interrupt entry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqCounts {
    pub update_events: u32,
    pub dispatches: u32,
    pub coalesced_requests: u32,
    pub missed_updates: u32,
}

pub struct IrqStats {
    update_events: AtomicU32,
    dispatches: AtomicU32,
    coalesced_requests: AtomicU32,
    missed_updates: AtomicU32,
}

impl IrqStats {
    pub const fn new() -> Self {
        IrqStats {
            update_events: AtomicU32::new(0),
            dispatches: AtomicU32::new(0),
            coalesced_requests: AtomicU32::new(0),
            missed_updates: AtomicU32::new(0),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IrqCounts {
        IrqCounts {
            update_events: self.update_events.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            missed_updates: self.missed_updates.load(Ordering::Relaxed),
        }
    }
}

impl Default for IrqStats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TimingCore {
    config: TimingConfig,
    timestamp: TimestampGenerator,
    deadline: DeadlineMonitor,
    pending: DeferredDispatch,
    stats: IrqStats,
    task_timer: TaskTimer,
    faults: FaultLog<FAULT_LOG_DEPTH>,
}

impl TimingCore {
    pub const fn new(config: TimingConfig) -> Self {
        TimingCore {
            config,
            timestamp: TimestampGenerator::new(),
            deadline: DeadlineMonitor::new(),
            pending: DeferredDispatch::new(),
            stats: IrqStats::new(),
            task_timer: TaskTimer::new(),
            faults: FaultLog::new(),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.timestamp.now()
    }

    pub fn stats(&self) -> IrqCounts {
        self.stats.snapshot()
    }

    pub fn task_timer(&self) -> &TaskTimer {
        &self.task_timer
    }

    pub fn faults(&self) -> &FaultLog<FAULT_LOG_DEPTH> {
        &self.faults
    }

    pub fn dispatch_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// Resets all loop state and starts the counters phase-locked. Must run before either
    /// interrupt is enabled; counter B's update interrupt is enabled on success.
    pub fn start_timers(
        &self,
        clocks: &PhaseClocks,
        units: [&dyn ConverterUnit; 3],
    ) -> Result<(), StartError> {
        self.start_timers_at(clocks, units, Timestamp::ZERO)
    }

    /// [`start_timers`](Self::start_timers), with the timestamp starting at `epoch`.
    pub fn start_timers_at(
        &self,
        clocks: &PhaseClocks,
        units: [&dyn ConverterUnit; 3],
        epoch: Timestamp,
    ) -> Result<(), StartError> {
        self.config.validate()?;
        self.timestamp.reset(epoch);
        self.deadline.reset();
        self.pending.reset();
        self.task_timer.reset(self.config.instrumentation_armed);
        phase_clock::start_synchronously(
            clocks,
            units,
            &InitialCounts::from_timing(&self.config),
        )
    }

    /// Thread mode. Drains the fault log and a finished instrumentation result into the logger.
    /// Returns the number of faults logged.
    pub fn service_logs(&self) -> usize {
        let dropped = self.faults.take_dropped();
        if dropped != 0 {
            warn!("{} fault records dropped", dropped);
        }
        let mut logged = 0;
        while let Some(record) = self.faults.pop() {
            warn!(
                "{} at {}, both axes disarmed",
                record.fault,
                record.timestamp.ticks()
            );
            logged += 1;
        }
        if let Some(times) = self.task_timer.take_result() {
            debug!("DC calibration wait: {:?}", times);
        }
        logged
    }

    // Runs at interrupt level, so it only records; `service_logs` does the logging.
    fn report(&self, axes: [&dyn FaultSink; 2], fault: Fault) {
        self.faults.record(self.timestamp.now(), fault);
        for axis in axes {
            axis.disarm_with_error(fault);
        }
    }
}
