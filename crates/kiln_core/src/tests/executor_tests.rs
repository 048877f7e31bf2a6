use super::*;

fn ramp() -> Profile {
    Profile::new("ramp", [(0, 25.0), (60, 25.0), (120, 500.0)])
}

fn config() -> KilnConfig {
    KilnConfig {
        heater_power_watts: 3600.0,
        kwh_rate: 0.5,
        ..KilnConfig::default()
    }
}

fn expect_running(outcome: TickOutcome) -> (StatusSnapshot, f64, LogEntry) {
    match outcome {
        TickOutcome::Running {
            snapshot,
            heat_fraction,
            entry,
        } => (snapshot, heat_fraction, entry),
        other => panic!("expected a running tick, got {other:?}"),
    }
}

#[test]
fn perfect_tracking_completes_at_the_end_of_the_schedule() {
    let profile = ramp();
    let mut executor = RunExecutor::new(&config());
    executor
        .start(profile.clone(), RunMode::Simulate, None)
        .expect("start");

    let mut reading = 25.0;
    let mut ticks = 0;
    let finished = loop {
        ticks += 1;
        match executor.tick(reading, 1.0) {
            TickOutcome::Running { snapshot, .. } => reading = snapshot.target,
            TickOutcome::Finished(finished) => break finished,
            TickOutcome::Idle => panic!("run went idle without finishing"),
        }
        assert!(ticks < 200, "run never completed");
    };

    assert_eq!(ticks, 120);
    assert_eq!(finished.snapshot.state, RunState::Complete);
    assert_eq!(finished.snapshot.time_stamp, 120.0);
    assert_eq!(finished.snapshot.target, 0.0);
    assert_eq!(finished.snapshot.heat, 0.0);
    assert_eq!(finished.notice.message, "Simulation Complete");
    assert!(finished.hazard.is_none());
    assert_eq!(executor.state(), RunState::Idle);
    assert_eq!(executor.backlog().log.len(), 119);
}

#[test]
fn cost_is_the_sum_of_power_times_heat_over_each_tick() {
    let mut executor = RunExecutor::new(&config());
    executor
        .start(ramp(), RunMode::Run, None)
        .expect("start");

    // a kiln that lags its target keeps the element busy
    let mut reading = 20.0;
    let finished = loop {
        match executor.tick(reading, 1.0) {
            TickOutcome::Running { snapshot, .. } => reading = snapshot.target - 3.0,
            TickOutcome::Finished(finished) => break finished,
            TickOutcome::Idle => panic!("run went idle without finishing"),
        }
    };

    let log = executor.backlog().log;
    let expected_kwh: f64 = log.iter().map(|e| 3600.0 * e.heat * 1.0 / 3600.0 / 1000.0).sum();
    assert!(expected_kwh > 0.0);
    assert!((finished.energy_kwh - expected_kwh).abs() < 1e-9);
    assert!((finished.notice.cost - expected_kwh * 0.5).abs() < 1e-9);
    assert_eq!(finished.notice.message, "Kiln Run Complete");
}

#[test]
fn start_while_running_is_busy_and_leaves_the_run_alone() {
    let mut executor = RunExecutor::new(&config());
    let first = executor
        .start(ramp(), RunMode::Run, None)
        .expect("start")
        .id;
    expect_running(executor.tick(25.0, 1.0));
    expect_running(executor.tick(25.0, 1.0));

    let err = executor
        .start(Profile::new("other", [(0, 20.0), (10, 30.0)]), RunMode::Simulate, None)
        .expect_err("busy");
    assert_eq!(err, ExecutorError::Busy);

    let run = executor.active_run().expect("still running");
    assert_eq!(run.id, first);
    assert_eq!(run.elapsed_seconds, 2.0);
    assert_eq!(run.profile.name, "ramp");
}

#[test]
fn invalid_profiles_do_not_start() {
    let mut executor = RunExecutor::new(&config());
    let err = executor
        .start(Profile::new("backwards", [(10, 100.0), (5, 200.0)]), RunMode::Run, None)
        .expect_err("invalid");
    assert!(matches!(err, ExecutorError::InvalidProfile(_)));
    assert_eq!(executor.state(), RunState::Idle);
}

#[test]
fn hazard_reading_forces_heat_off_and_aborts() {
    let mut executor = RunExecutor::new(&config());
    executor
        .start(ramp(), RunMode::Run, None)
        .expect("start");
    expect_running(executor.tick(25.0, 1.0));

    let TickOutcome::Finished(finished) = executor.tick(1501.0, 1.0) else {
        panic!("hazard should end the run");
    };
    assert_eq!(finished.snapshot.state, RunState::Aborted);
    assert_eq!(finished.snapshot.heat, 0.0);
    assert_eq!(finished.notice.message, "Kiln Run Aborted");
    let hazard = finished.hazard.expect("hazard recorded");
    assert_eq!(hazard.actual, 1501.0);
    assert_eq!(executor.state(), RunState::Idle);
}

#[test]
fn hazard_on_the_final_tick_aborts_instead_of_completing() {
    let mut executor = RunExecutor::new(&config());
    executor
        .start(Profile::new("short", [(0, 25.0), (2, 30.0)]), RunMode::Run, None)
        .expect("start");
    expect_running(executor.tick(25.0, 1.0));

    let TickOutcome::Finished(finished) = executor.tick(1600.0, 1.0) else {
        panic!("the final tick should end the run");
    };
    assert_eq!(finished.notice.state, RunState::Aborted);
    assert_eq!(finished.notice.message, "Kiln Run Aborted");
    assert_eq!(finished.hazard.map(|h| h.actual), Some(1600.0));
}

#[test]
fn stop_aborts_once_and_is_a_no_op_when_idle() {
    let mut executor = RunExecutor::new(&config());
    assert!(executor.stop().is_none());
    assert!(executor.stop().is_none());

    executor
        .start(ramp(), RunMode::Simulate, None)
        .expect("start");
    expect_running(executor.tick(25.0, 1.0));

    let finished = executor.stop().expect("aborted");
    assert_eq!(finished.snapshot.state, RunState::Aborted);
    assert_eq!(finished.notice.message, "Simulation Aborted");
    assert!(executor.stop().is_none());
    assert_eq!(executor.tick(25.0, 1.0), TickOutcome::Idle);
}

#[test]
fn start_at_skips_ahead_in_the_schedule() {
    let mut executor = RunExecutor::new(&config());
    let run = executor
        .start(ramp(), RunMode::Simulate, Some(90))
        .expect("start");
    assert_eq!(run.elapsed_seconds, 90.0);
    assert!((run.target_temperature - 262.5).abs() < 1e-9);

    let (snapshot, _, _) = expect_running(executor.tick(260.0, 1.0));
    assert_eq!(snapshot.time_stamp, 91.0);
}

#[test]
fn catch_up_holds_the_schedule_while_the_kiln_lags() {
    let mut config = config();
    config.catch_up = CatchUpConfig {
        enabled: true,
        pause_window: 50.0,
    };
    let mut executor = RunExecutor::new(&config);
    executor
        .start(ramp(), RunMode::Simulate, Some(100))
        .expect("start");

    // target at 100 s is ~341, far above the reading
    let (held, _, _) = expect_running(executor.tick(100.0, 1.0));
    assert_eq!(held.time_stamp, 100.0);

    let (moving, _, _) = expect_running(executor.tick(330.0, 1.0));
    assert_eq!(moving.time_stamp, 101.0);
}

#[test]
fn backlog_outlives_the_run_until_the_next_start() {
    let mut executor = RunExecutor::new(&config());
    assert_eq!(executor.backlog(), Backlog::default());

    executor
        .start(ramp(), RunMode::Simulate, None)
        .expect("start");
    for _ in 0..3 {
        expect_running(executor.tick(25.0, 1.0));
    }
    assert_eq!(executor.backlog().log.len(), 3);

    executor.stop().expect("stop");
    let backlog = executor.backlog();
    assert_eq!(backlog.profile.map(|p| p.name), Some("ramp".to_string()));
    assert_eq!(backlog.log.len(), 3);

    executor
        .start(Profile::new("next", [(0, 20.0), (60, 40.0)]), RunMode::Simulate, None)
        .expect("start");
    assert!(executor.backlog().log.is_empty());
}

#[test]
fn status_reports_running_and_idle_snapshots() {
    let mut executor = RunExecutor::new(&config());
    assert_eq!(executor.tick(21.5, 1.0), TickOutcome::Idle);
    assert_eq!(executor.status(), StatusSnapshot::idle(21.5));

    executor
        .start(ramp(), RunMode::Simulate, None)
        .expect("start");
    let (snapshot, _, entry) = expect_running(executor.tick(25.0, 1.0));
    assert_eq!(executor.status(), snapshot);
    assert_eq!(snapshot.state, RunState::Running);
    assert_eq!(snapshot.total_time, 120);
    assert!(snapshot.is_simulation);
    assert_eq!(snapshot.profile.as_deref(), Some("ramp"));
    assert!(snapshot.pid_stats.is_some());
    assert_eq!(entry.time_stamp, 1.0);
    assert_eq!(entry.target, 25.0);
}
