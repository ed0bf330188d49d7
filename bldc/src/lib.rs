#![cfg_attr(not(test), no_std)]

pub mod util;

pub mod axis;
pub mod board;
pub mod config;
pub mod control_loop;
pub mod current_sensing;
pub mod deadline;
pub mod fault;
pub mod peripherals;
pub mod phase_clock;
pub mod task_timer;
pub mod timer;
pub mod timestamp;

pub use axis::{AuxOutput, AxisCallbacks, ControlLoop, Sampler};
pub use config::{ConfigError, TimingConfig, DEFAULT_TIMING};
pub use control_loop::TimingCore;
pub use current_sensing::PhaseCurrents;
pub use fault::{AxisFaultState, Fault, FaultSink};
pub use timestamp::Timestamp;
