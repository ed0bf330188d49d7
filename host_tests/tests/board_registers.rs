#[cfg(test)]
mod tests {
    use dual_bldc::board::registers::{adc, gpio, tim};
    use dual_bldc::board::{
        Adc, GateDriverLines, Pin, Timer, Triggers, DISPATCH_IRQ, IRQ_PRIORITIES, UPDATE_IRQ,
    };
    use dual_bldc::peripherals::{
        ConversionFlags, ConverterUnit, Direction, GateDriver, PhaseCounter, PwmStage,
    };

    #[test]
    fn seeding_loads_direction_and_restores_mode() {
        let regs = tim::RegisterBlock::new();
        // Center-aligned mode 1, enabled.
        regs.cr1.write(0b01 << 5 | tim::CR1_CEN);
        let timer = Timer::new(&regs);

        timer.halt();
        assert!(!timer.is_running());
        timer.seed(1234, Direction::Down);
        assert_eq!(regs.cr1.read().cms(), 0b01);
        assert_eq!(timer.count(), 1234);
        assert_eq!(timer.direction(), Direction::Down);

        timer.seed(7, Direction::Up);
        assert_eq!(timer.direction(), Direction::Up);
        timer.resume();
        assert!(timer.is_running());
        assert_eq!(regs.cr1.read().cms(), 0b01);
    }

    #[test]
    fn timer_counts_are_sixteen_bits() {
        let regs = tim::RegisterBlock::new();
        regs.arr.write(3500);
        regs.cnt.write(0x1_0005);
        let timer = Timer::new(&regs);
        assert_eq!(timer.period(), 3500);
        assert_eq!(timer.count(), 5);
    }

    #[test]
    fn update_flag_is_cleared_by_writing_zero() {
        let regs = tim::RegisterBlock::new();
        regs.sr.write(0x1F);
        let timer = Timer::new(&regs);
        timer.acknowledge_update();
        assert_eq!(regs.sr.read().bits(), !tim::SR_UIF);
        assert!(!regs.sr.read().uif());

        assert!(!regs.dier.read().uie());
        timer.enable_update_interrupt();
        assert!(regs.dier.read().uie());
    }

    #[test]
    fn stage_follows_main_output_enable() {
        let regs = tim::RegisterBlock::new();
        regs.ccr[3].write(99);
        let timer = Timer::new(&regs);
        assert!(!timer.is_switching());
        regs.bdtr.modify(|_, w| w.set_moe(true));
        assert!(timer.is_switching());

        timer.stage_duty(1750);
        for ccr in &regs.ccr[..3] {
            assert_eq!(ccr.read().ccr(), 1750);
        }
        assert_eq!(regs.ccr[3].read().ccr(), 99);
    }

    #[test]
    fn trigger_gating_only_touches_used_triggers() {
        let regs = adc::RegisterBlock::new();
        regs.cr2.write(0b10 << 28);
        let bus = Adc::new(
            &regs,
            Triggers {
                injected: true,
                regular: false,
            },
        );

        bus.set_triggers(true);
        assert_eq!(regs.cr2.read().jexten(), adc::TRIGGER_RISING);
        assert_eq!(regs.cr2.read().exten(), 0b10);
        bus.set_triggers(false);
        assert_eq!(regs.cr2.read().jexten(), 0);
        assert_eq!(regs.cr2.read().exten(), 0b10);

        let phase = Adc::new(
            &regs,
            Triggers {
                injected: true,
                regular: true,
            },
        );
        phase.set_triggers(true);
        assert_eq!(regs.cr2.read().exten(), adc::TRIGGER_RISING);
        assert_eq!(regs.cr2.read().jexten(), adc::TRIGGER_RISING);
    }

    #[test]
    fn converter_flags_and_results() {
        let regs = adc::RegisterBlock::new();
        let unit = Adc::new(
            &regs,
            Triggers {
                injected: true,
                regular: true,
            },
        );
        regs.sr.write(adc::SR_JEOC | adc::SR_OVR);
        assert_eq!(
            unit.flags(),
            ConversionFlags {
                injected: true,
                regular: false,
                overrun: true,
            }
        );

        unit.clear_flags(ConversionFlags::INJECTED);
        assert_eq!(regs.sr.read().bits(), !adc::SR_JEOC);
        unit.clear_flags(ConversionFlags::ALL);
        assert_eq!(
            regs.sr.read().bits(),
            !(adc::SR_JEOC | adc::SR_EOC | adc::SR_OVR)
        );

        regs.jdr[0].write(0xABCD_0123);
        regs.dr.write(0x0FFF);
        assert_eq!(unit.injected_result(), 0x0123);
        assert_eq!(unit.regular_result(), 0x0FFF);
    }

    #[test]
    fn update_handler_preempts_dispatcher() {
        let priority = |irq| {
            IRQ_PRIORITIES
                .iter()
                .find(|(candidate, _)| *candidate == irq)
                .map(|&(_, priority)| priority)
                .expect("no priority for handler")
        };
        let update = priority(UPDATE_IRQ);
        let dispatch = priority(DISPATCH_IRQ);
        assert!(update < dispatch);
        // Only the top four bits are implemented; the rest read back as zero.
        assert_eq!(update & 0x0F, 0);
        assert_eq!(dispatch & 0x0F, 0);
        // Under the reset grouping all four bits are preemption priority.
        assert!(update >> 4 < dispatch >> 4);
    }

    #[test]
    fn gate_driver_needs_enable_and_no_fault() {
        let port_b = gpio::RegisterBlock::new();
        let port_d = gpio::RegisterBlock::new();
        let gate = GateDriverLines {
            enable: Pin {
                port: &port_b,
                index: 12,
            },
            n_fault: Pin {
                port: &port_d,
                index: 2,
            },
        };
        assert!(!gate.is_ready());

        port_b.odr.write(1 << 12);
        assert!(!gate.is_ready());
        // nFAULT is active low.
        port_d.idr.write(1 << 2);
        assert!(gate.is_ready());

        port_b.odr.write(0);
        assert!(!gate.is_ready());
    }
}
