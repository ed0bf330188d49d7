mod common;

#[cfg(test)]
mod tests {
    use super::common::init_logs;
    use dual_bldc::config::{TimingConfig, DEFAULT_TIMING};
    use dual_bldc::control_loop::UpdateOutcome;
    use dual_bldc::current_sensing::PhaseCurrents;
    use dual_bldc::fault::{Fault, FaultRecord};
    use dual_bldc::timestamp::Timestamp;
    use host_tests::{Recorder, SimRig};

    const QUANTUM: u32 = DEFAULT_TIMING.quantum();
    const OFFSET: u32 = DEFAULT_TIMING.axis0_offset;

    fn started_rig(config: TimingConfig) -> SimRig {
        init_logs();
        let rig = SimRig::new(config);
        rig.start().expect("start failed");
        rig
    }

    fn drained_faults(rig: &SimRig) -> Vec<FaultRecord> {
        let mut records = Vec::new();
        rig.core.faults().drain(|record| records.push(record));
        records
    }

    #[test]
    fn one_dispatch_per_upward_transition() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        let reports = rig.run_periods(25, &mut recorder);

        assert_eq!(reports.len(), 25);
        assert!(reports.iter().all(|report| report.faults == 0));
        let stats = rig.core.stats();
        assert_eq!(stats.dispatches, 25);
        assert_eq!(stats.coalesced_requests, 0);
        assert_eq!(stats.missed_updates, 0);
        assert_eq!(stats.update_events, 1 + 2 * 25);
        assert_eq!(rig.trigger.pends.get(), 25);
        assert_eq!(rig.sampler.calls.get(), 25);
        assert_eq!(recorder.control.timestamps.len(), 25);
        assert!(rig.axes.iter().all(|axis| axis.is_armed()));
        assert!(drained_faults(&rig).is_empty());
    }

    #[test]
    fn callbacks_are_timestamped_relative_to_entry() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        rig.run_periods(3, &mut recorder);

        for (k, &t) in recorder.control.timestamps.iter().enumerate() {
            // Dispatch k starts after the neutral event and 2k+1 further events.
            assert_eq!(t, Timestamp(2 * QUANTUM + 2 * QUANTUM * k as u32));

            let [axis0, axis1] = &recorder.axes;
            assert_eq!(axis0.current_meas[k].0, t - OFFSET);
            assert_eq!(axis1.current_meas[k].0, t);
            assert_eq!(axis0.dc_calib[k].0, t + QUANTUM - OFFSET);
            assert_eq!(axis1.dc_calib[k].0, t + QUANTUM);
            assert_eq!(axis0.pwm_update[k], t + 3 * QUANTUM - OFFSET);
            assert_eq!(axis1.pwm_update[k], t + 3 * QUANTUM);
            assert_eq!(recorder.aux.updates[k], t + 3 * QUANTUM - OFFSET);
        }
        assert_eq!(recorder.control.vbus, vec![1000; 6]);
    }

    #[test]
    fn nominal_samples_reach_both_axes() {
        let rig = started_rig(DEFAULT_TIMING);
        rig.set_codes((2048, 2048), (2048, 2048));
        let mut recorder = Recorder::new(&rig);
        rig.run_periods(2, &mut recorder);
        for axis in &recorder.axes {
            for (_, current) in axis.current_meas.iter().chain(&axis.dc_calib) {
                assert_eq!(*current, Some(PhaseCurrents::ZERO));
            }
        }
    }

    #[test]
    fn counting_down_stages_neutral_duty() {
        let rig = started_rig(DEFAULT_TIMING);
        assert_eq!(rig.update_event(), UpdateOutcome::Neutral);
        for stage in &rig.stages {
            assert_eq!(stage.duty.get(), Some(DEFAULT_TIMING.period_clocks / 2));
        }
        assert_eq!(rig.trigger.pends.get(), 0);
    }

    #[test]
    fn idle_bridge_reports_zero_current() {
        let rig = started_rig(DEFAULT_TIMING);
        rig.stages[0].switching.set(false);
        rig.set_codes((2300, 1800), (2300, 1800));
        let mut recorder = Recorder::new(&rig);
        rig.run_periods(1, &mut recorder);

        let [axis0, axis1] = &recorder.axes;
        assert_eq!(axis0.current_meas[0].1, Some(PhaseCurrents::ZERO));
        assert_ne!(axis1.current_meas[0].1, Some(PhaseCurrents::ZERO));
        assert!(axis1.current_meas[0].1.is_some());
        // The calibration sample is measured regardless.
        assert_ne!(axis0.dc_calib[0].1, Some(PhaseCurrents::ZERO));
    }

    #[test]
    fn failed_first_fetch_is_bad_timing() {
        let rig = started_rig(TimingConfig {
            dc_calib_wait_limit: 100,
            ..DEFAULT_TIMING
        });
        rig.units[1].stall(true);
        rig.set_codes((3000, 3000), (3000, 3000));
        let mut recorder = Recorder::new(&rig);
        let reports = rig.run_periods(1, &mut recorder);

        assert!(reports[0].has(Fault::BadTiming));
        for axis in &rig.axes {
            assert!(axis.has(Fault::BadTiming));
            assert!(!axis.is_armed());
        }
        for axis in &recorder.axes {
            assert_eq!(axis.current_meas.len(), 1);
            assert!(axis.current_meas.iter().all(|(_, current)| current
                .map_or(true, |current| current == PhaseCurrents::ZERO)));
        }
    }

    #[test]
    fn failed_second_fetch_is_bad_timing() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        // Phase B still converts, so the wait succeeds but the batch is incomplete.
        recorder.control.stall_unit = Some(2);
        let reports = rig.run_periods(1, &mut recorder);

        let report = reports[0];
        assert_eq!(report.faults, Fault::BadTiming.code());
        assert_eq!(report.dc_calib_spins, Some(0));
        for axis in &recorder.axes {
            assert_eq!(axis.current_meas.len(), 1);
            assert!(axis.current_meas[0].1.is_some());
            assert_eq!(axis.dc_calib.len(), 1);
            assert_eq!(axis.dc_calib[0].1, None);
            assert_eq!(axis.pwm_update.len(), 1);
        }
        for axis in &rig.axes {
            assert!(axis.has(Fault::BadTiming));
            assert!(!axis.has(Fault::ControlDeadlineMissed));
            assert!(!axis.is_armed());
        }
        // Only the first fetch delivered a bus voltage.
        assert_eq!(recorder.control.vbus, vec![1000]);
        assert_eq!(
            drained_faults(&rig),
            vec![FaultRecord {
                timestamp: report.timestamp + QUANTUM,
                fault: Fault::BadTiming
            }]
        );
    }

    #[test]
    fn dc_calibration_wait_times_out() {
        let rig = started_rig(TimingConfig {
            dc_calib_wait_limit: 100,
            ..DEFAULT_TIMING
        });
        let mut recorder = Recorder::new(&rig);
        recorder.control.preemptions = 0;
        let reports = rig.run_periods(1, &mut recorder);

        let report = reports[0];
        assert_eq!(report.dc_calib_spins, None);
        assert!(report.has(Fault::BadTiming));
        assert!(report.has(Fault::ControlDeadlineMissed));
        for axis in &recorder.axes {
            assert!(axis.current_meas[0].1.is_some());
            assert_eq!(axis.dc_calib[0].1, None);
        }
        for axis in &rig.axes {
            assert!(axis.has(Fault::BadTiming));
        }
    }

    #[test]
    fn overlong_control_law_misses_deadline() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        recorder.control.preemptions = 2;
        let reports = rig.run_periods(1, &mut recorder);

        let report = reports[0];
        assert!(report.has(Fault::ControlDeadlineMissed));
        assert!(!report.has(Fault::BadTiming));
        for axis in &rig.axes {
            assert!(axis.has(Fault::ControlDeadlineMissed));
            assert!(!axis.is_armed());
        }
        assert_eq!(
            recorder.control.preempted_by,
            vec![
                UpdateOutcome::Neutral,
                UpdateOutcome::Dispatch { coalesced: false }
            ]
        );
        assert_eq!(rig.core.now(), report.timestamp + 2 * QUANTUM);
        let faults = drained_faults(&rig);
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].fault, Fault::ControlDeadlineMissed);
    }

    #[test]
    fn repeated_direction_is_a_missed_update() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        rig.run_periods(3, &mut recorder);
        let now = rig.core.now();
        let pends = rig.trigger.pends.get();

        assert_eq!(rig.repeated_update_event(), UpdateOutcome::Missed);

        for axis in &rig.axes {
            assert!(axis.has(Fault::TimerUpdateMissed));
            assert!(!axis.is_armed());
        }
        assert_eq!(rig.core.now(), now);
        assert_eq!(rig.trigger.pends.get(), pends);
        assert!(!rig.core.dispatch_pending());
        assert_eq!(rig.core.stats().missed_updates, 1);
        assert_eq!(
            drained_faults(&rig),
            vec![FaultRecord {
                timestamp: now,
                fault: Fault::TimerUpdateMissed
            }]
        );
    }

    #[test]
    fn recorded_faults_are_logged_from_thread_mode() {
        let rig = started_rig(DEFAULT_TIMING);
        let mut recorder = Recorder::new(&rig);
        recorder.control.preemptions = 2;
        rig.run_periods(1, &mut recorder);
        assert_eq!(rig.repeated_update_event(), UpdateOutcome::Missed);

        // Interrupt level only records.
        assert_eq!(rig.core.faults().len(), 2);
        assert_eq!(rig.core.service_logs(), 2);
        assert_eq!(rig.core.faults().len(), 0);
        assert_eq!(rig.core.service_logs(), 0);
    }

    #[test]
    fn deadline_holds_across_timestamp_wrap() {
        let epoch = Timestamp(u32::MAX - 2 * QUANTUM - 100);
        init_logs();
        let rig = SimRig::new(DEFAULT_TIMING);
        rig.start_at(epoch).expect("start failed");
        let mut recorder = Recorder::new(&rig);
        let reports = rig.run_periods(3, &mut recorder);

        assert!(reports.iter().all(|report| report.faults == 0));
        assert!(rig.axes.iter().all(|axis| axis.is_armed()));
        assert!(drained_faults(&rig).is_empty());

        let t = recorder.control.timestamps[0];
        assert_eq!(t, Timestamp(u32::MAX - 100));
        let calib_at = recorder.axes[1].dc_calib[0].0;
        assert_eq!(calib_at, Timestamp(QUANTUM - 101));
        assert_eq!(calib_at.since(t), QUANTUM as i32);
        assert_eq!(recorder.axes[0].dc_calib[0].0, calib_at - OFFSET);
        for (k, &t) in recorder.control.timestamps.iter().enumerate() {
            assert_eq!(t, epoch + 2 * QUANTUM * (k as u32 + 1));
        }
    }

    #[test]
    fn late_dispatch_coalesces_requests() {
        let rig = started_rig(DEFAULT_TIMING);
        assert_eq!(rig.update_event(), UpdateOutcome::Neutral);
        assert_eq!(
            rig.update_event(),
            UpdateOutcome::Dispatch { coalesced: false }
        );
        assert_eq!(rig.update_event(), UpdateOutcome::Neutral);
        assert_eq!(
            rig.update_event(),
            UpdateOutcome::Dispatch { coalesced: true }
        );
        assert_eq!(rig.core.stats().coalesced_requests, 1);

        let mut recorder = Recorder::new(&rig);
        assert!(rig.dispatch(&mut recorder).is_some());
        assert!(rig.dispatch(&mut recorder).is_none());
        assert_eq!(rig.core.stats().dispatches, 1);
    }

    #[test]
    fn instrumentation_runs_for_one_period() {
        let rig = started_rig(TimingConfig {
            instrumentation_armed: true,
            ..DEFAULT_TIMING
        });
        let timer = rig.core.task_timer();
        assert!(timer.is_armed());

        // Only a counting-up transition latches the request.
        rig.update_event();
        assert!(!timer.is_enabled());

        let mut recorder = Recorder::new(&rig);
        rig.run_periods(1, &mut recorder);
        assert!(!timer.is_armed());
        assert!(!timer.is_enabled());
        let times = timer.times();
        assert_eq!(times.start, times.end);
        assert_eq!(times.length, 0);
        assert_eq!(timer.take_result(), Some(times));
        assert_eq!(timer.take_result(), None);

        timer.arm();
        recorder.control.preemptions = 0;
        rig.run_periods(1, &mut recorder);
        assert!(!timer.is_armed());
    }
}
