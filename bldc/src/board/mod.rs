//! STM32F405 binding: TIM1/TIM8 drive the two axes, TIM13 is the tick counter, ADC1 converts the
//! bus voltage and ADC2/ADC3 convert phases B and C of both axes.
//!
//! The application owns the vector table. Its `TIM8_UP_TIM13` handler calls
//! [`timer_update_isr`] and its `OTG_HS` handler (the dispatcher interrupt, pended in software)
//! calls [`control_loop_isr`]. Its idle loop calls [`service_logs`], since neither handler
//! writes to the logger.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;

use crate::axis::Sampler;
use crate::config::DEFAULT_TIMING;
use crate::control_loop::{
    ControlLaw, DispatchHardware, DispatchReport, TimingCore, UpdateHardware, UpdateOutcome,
};
use crate::current_sensing::{SampleCollector, ShuntAmplifier};
use crate::fault::AxisFaultState;
use crate::peripherals::{
    ConversionFlags, ConverterUnit, Direction, GateDriver, PhaseCounter, PwmStage,
    SoftwareTrigger,
};
use crate::phase_clock::{PhaseClocks, StartError};
use crate::util::spin_lock::{acquire_hw, SpinLock};

pub mod itm_log;
pub mod registers;

use registers::{adc, gpio, tim};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum Interrupt {
    TIM8_UP_TIM13 = 44,
    OTG_HS = 77,
}

// Safety: the discriminants are the STM32F405 position numbers.
unsafe impl InterruptNumber for Interrupt {
    fn number(self) -> u16 {
        self as u16
    }
}

pub const UPDATE_IRQ: Interrupt = Interrupt::TIM8_UP_TIM13;
pub const DISPATCH_IRQ: Interrupt = Interrupt::OTG_HS;

/// NVIC priority of each handler. Lower is more urgent; the F405 implements the top four bits.
/// The update handler must be able to preempt the dispatcher.
pub const IRQ_PRIORITIES: [(Interrupt, u8); 2] = [(UPDATE_IRQ, 0x00), (DISPATCH_IRQ, 0x50)];

/// TIM1, TIM8 or TIM13.
#[derive(Clone, Copy)]
pub struct Timer<'a> {
    regs: &'a tim::RegisterBlock,
}

// Safety: every access is a single volatile read or write of a register that the counter's
// owner (the update handler or dispatcher) is allowed to touch.
unsafe impl Send for Timer<'_> {}

impl<'a> Timer<'a> {
    pub fn new(regs: &'a tim::RegisterBlock) -> Self {
        Timer { regs }
    }
}

impl Timer<'static> {
    /// # Safety
    ///
    /// `base` must be the base address of an STM32F4 timer.
    pub unsafe fn at(base: usize) -> Self {
        Timer::new(&*(base as *const tim::RegisterBlock))
    }
}

impl PhaseCounter for Timer<'_> {
    fn period(&self) -> u32 {
        self.regs.arr.read().arr()
    }

    fn halt(&self) {
        self.regs.cr1.modify(|_, w| w.set_cen(false));
    }

    fn seed(&self, count: u32, direction: Direction) {
        // DIR is read-only while center-aligned, so drop to edge-aligned mode to load it.
        let cms = self.regs.cr1.read().cms();
        self.regs.cr1.modify(|_, w| w.set_cms(0));
        self.regs
            .cr1
            .modify(|_, w| w.set_dir(direction == Direction::Down));
        self.regs.cnt.write(count);
        self.regs.cr1.modify(|_, w| w.set_cms(cms));
    }

    fn resume(&self) {
        self.regs.cr1.modify(|_, w| w.set_cen(true));
    }

    fn is_running(&self) -> bool {
        self.regs.cr1.read().cen()
    }

    fn count(&self) -> u32 {
        self.regs.cnt.read().cnt()
    }

    fn direction(&self) -> Direction {
        if self.regs.cr1.read().dir() {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    fn acknowledge_update(&self) {
        // rc_w0: writing 1 leaves the other flags alone.
        self.regs.sr.write(!tim::SR_UIF);
    }

    fn enable_update_interrupt(&self) {
        self.regs.dier.modify(|_, w| w.set_uie(true));
    }
}

impl PwmStage for Timer<'_> {
    fn is_switching(&self) -> bool {
        self.regs.bdtr.read().moe()
    }

    fn stage_duty(&self, compare: u32) {
        for ccr in &self.regs.ccr[..3] {
            ccr.write(compare);
        }
    }
}

/// Which external triggers a converter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triggers {
    pub injected: bool,
    pub regular: bool,
}

#[derive(Clone, Copy)]
pub struct Adc<'a> {
    regs: &'a adc::RegisterBlock,
    triggers: Triggers,
}

// Safety: see `Timer`.
unsafe impl Send for Adc<'_> {}

impl<'a> Adc<'a> {
    pub fn new(regs: &'a adc::RegisterBlock, triggers: Triggers) -> Self {
        Adc { regs, triggers }
    }
}

impl Adc<'static> {
    /// # Safety
    ///
    /// `base` must be the base address of an STM32F4 ADC.
    pub unsafe fn at(base: usize, triggers: Triggers) -> Self {
        Adc::new(&*(base as *const adc::RegisterBlock), triggers)
    }
}

impl ConverterUnit for Adc<'_> {
    fn set_triggers(&self, enabled: bool) {
        let edge = if enabled { adc::TRIGGER_RISING } else { 0 };
        let triggers = self.triggers;
        self.regs.cr2.modify(|r, w| {
            w.set_jexten(if triggers.injected { edge } else { r.jexten() })
                .set_exten(if triggers.regular { edge } else { r.exten() })
        });
    }

    fn flags(&self) -> ConversionFlags {
        let sr = self.regs.sr.read();
        ConversionFlags {
            injected: sr.jeoc(),
            regular: sr.eoc(),
            overrun: sr.ovr(),
        }
    }

    fn injected_result(&self) -> u16 {
        self.regs.jdr[0].read().jdata() as u16
    }

    fn regular_result(&self) -> u16 {
        self.regs.dr.read().data() as u16
    }

    fn clear_flags(&self, flags: ConversionFlags) {
        let mut clear = 0;
        if flags.injected {
            clear |= adc::SR_JEOC;
        }
        if flags.regular {
            clear |= adc::SR_EOC;
        }
        if flags.overrun {
            clear |= adc::SR_OVR;
        }
        // rc_w0
        self.regs.sr.write(!clear);
    }
}

#[derive(Clone, Copy)]
pub struct Pin<'a> {
    pub port: &'a gpio::RegisterBlock,
    pub index: u8,
}

impl Pin<'static> {
    /// # Safety
    ///
    /// `port` must name an existing GPIO port (0 = A).
    pub unsafe fn at(port: usize, index: u8) -> Self {
        Pin {
            port: &*((registers::GPIOA_BASE + port * registers::GPIO_STRIDE)
                as *const gpio::RegisterBlock),
            index,
        }
    }
}

/// Gate driver is ready when its enable output is driven high and it is not pulling nFAULT low.
#[derive(Clone, Copy)]
pub struct GateDriverLines<'a> {
    pub enable: Pin<'a>,
    pub n_fault: Pin<'a>,
}

// Safety: input and output data registers are only read.
unsafe impl Send for GateDriverLines<'_> {}

impl GateDriver for GateDriverLines<'_> {
    fn is_ready(&self) -> bool {
        self.enable.port.odr.read().bit(self.enable.index as u32)
            && self.n_fault.port.idr.read().bit(self.n_fault.index as u32)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NvicTrigger(pub Interrupt);

impl SoftwareTrigger for NvicTrigger {
    fn trigger(&self) {
        NVIC::pend(self.0);
    }
}

/// Everything the board contributes. Handles are plain register references, so copies of the
/// same timer can be handed to both interrupt levels.
#[derive(Clone, Copy)]
pub struct Board {
    pub tim1: Timer<'static>,
    pub tim8: Timer<'static>,
    pub tim13: Timer<'static>,
    pub adc1: Adc<'static>,
    pub adc2: Adc<'static>,
    pub adc3: Adc<'static>,
    pub gates: [GateDriverLines<'static>; 2],
}

impl Board {
    /// # Safety
    ///
    /// Must be called once; the returned handles alias the peripherals.
    pub unsafe fn take() -> Board {
        let both = Triggers {
            injected: true,
            regular: true,
        };
        Board {
            tim1: Timer::at(registers::TIM1_BASE),
            tim8: Timer::at(registers::TIM8_BASE),
            tim13: Timer::at(registers::TIM13_BASE),
            adc1: Adc::at(
                registers::ADC1_BASE,
                Triggers {
                    injected: true,
                    regular: false,
                },
            ),
            adc2: Adc::at(registers::ADC2_BASE, both),
            adc3: Adc::at(registers::ADC3_BASE, both),
            // EN_GATE on PB12, nFAULT on PD2; both drivers share them.
            gates: [GateDriverLines {
                enable: Pin::at(1, 12),
                n_fault: Pin::at(3, 2),
            }; 2],
        }
    }
}

pub struct UpdateParts {
    counter: Timer<'static>,
    stages: [Timer<'static>; 2],
    trigger: NvicTrigger,
}

pub struct DispatchParts {
    board: Board,
    calibrations: [ShuntAmplifier; 2],
}

pub static CORE: TimingCore = TimingCore::new(DEFAULT_TIMING);
pub static AXIS_FAULTS: [AxisFaultState; 2] = [AxisFaultState::new(), AxisFaultState::new()];

static UPDATE_HW: SpinLock<Option<UpdateParts>> = SpinLock::new(None);
static DISPATCH_HW: SpinLock<Option<DispatchParts>> = SpinLock::new(None);

/// Donates the board to the interrupt handlers, sets their priorities, starts the counters and
/// unmasks both interrupts. Thread mode, before the loop runs.
pub fn start(
    nvic: &mut NVIC,
    board: Board,
    calibrations: [ShuntAmplifier; 2],
) -> Result<(), StartError> {
    NVIC::mask(UPDATE_IRQ);
    NVIC::mask(DISPATCH_IRQ);
    *UPDATE_HW.lock() = Some(UpdateParts {
        counter: board.tim8,
        stages: [board.tim1, board.tim8],
        trigger: NvicTrigger(DISPATCH_IRQ),
    });
    *DISPATCH_HW.lock() = Some(DispatchParts {
        board,
        calibrations,
    });

    // Safety: both interrupts are masked, so no handler observes a half-applied priority scheme.
    unsafe {
        for (irq, priority) in IRQ_PRIORITIES {
            nvic.set_priority(irq, priority);
        }
    }

    CORE.start_timers(
        &PhaseClocks {
            a: &board.tim1,
            b: &board.tim8,
            c: &board.tim13,
        },
        [&board.adc1, &board.adc2, &board.adc3],
    )?;

    // Safety: both handlers have their hardware and the loop state was just reset.
    unsafe {
        NVIC::unmask(UPDATE_IRQ);
        NVIC::unmask(DISPATCH_IRQ);
    }
    Ok(())
}

/// Thread-mode half of fault reporting: logs and drains what the handlers recorded.
pub fn service_logs() -> usize {
    CORE.service_logs()
}

pub fn timer_update_isr(sampler: &dyn Sampler) -> UpdateOutcome {
    let hw = acquire_hw(&UPDATE_HW);
    CORE.on_update_event(&UpdateHardware {
        counter: &hw.counter,
        stages: [&hw.stages[0], &hw.stages[1]],
        trigger: &hw.trigger,
        axes: [&AXIS_FAULTS[0], &AXIS_FAULTS[1]],
        sampler,
    })
}

pub fn control_loop_isr(law: &mut ControlLaw) -> Option<DispatchReport> {
    let hw = acquire_hw(&DISPATCH_HW);
    let board = &hw.board;
    CORE.dispatch(
        &DispatchHardware {
            collector: SampleCollector {
                vbus: &board.adc1,
                phase_b: &board.adc2,
                phase_c: &board.adc3,
                gates: [&board.gates[0], &board.gates[1]],
                calibrations: [&hw.calibrations[0], &hw.calibrations[1]],
            },
            stages: [&board.tim1, &board.tim8],
            tick_counter: &board.tim13,
            axes: [&AXIS_FAULTS[0], &AXIS_FAULTS[1]],
        },
        law,
    )
}
