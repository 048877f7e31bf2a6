use super::*;
use crate::{
    domain::{RunMode, TempScale, TimeScale},
    error::ErrorCode,
    protocol::{Backlog, LogEntry},
};

fn status(state: RunState, time_stamp: f64, temperature: f64, target: f64) -> ServerEvent {
    ServerEvent::OvenUpdate(StatusSnapshot {
        state,
        temperature,
        target,
        heat: 0.5,
        time_stamp,
        total_time: 120,
        cost: 0.42,
        is_simulation: true,
        profile: Some("bisque".into()),
        pid_stats: None,
    })
}

#[test]
fn backlog_seeds_the_live_graph() {
    let mut view = ClientViewModel::new();
    let notice = view.apply(&ServerEvent::BacklogData(Backlog {
        profile: Some(Profile::new("bisque", [(0, 25.0), (120, 500.0)])),
        log: vec![
            LogEntry {
                time_stamp: 1.0,
                temperature: 25.5,
                target: 29.0,
                heat: 1.0,
            },
            LogEntry {
                time_stamp: 2.0,
                temperature: 27.0,
                target: 33.0,
                heat: 1.0,
            },
        ],
    }));

    assert!(notice.is_none());
    assert_eq!(view.live, vec![(1.0, 25.5), (2.0, 27.0)]);
    assert_eq!(view.run_profile.as_ref().map(|p| p.name.as_str()), Some("bisque"));
}

#[test]
fn new_run_clears_previous_samples() {
    let mut view = ClientViewModel::new();
    view.live = vec![(10.0, 900.0)];

    view.apply(&status(RunState::Idle, 0.0, 20.0, 0.0));
    assert_eq!(view.live, vec![(10.0, 900.0)]);

    view.apply(&status(RunState::Running, 1.0, 21.0, 25.0));
    view.apply(&status(RunState::Running, 2.0, 22.0, 25.0));
    assert_eq!(view.live, vec![(1.0, 21.0), (2.0, 22.0)]);
    assert_eq!(view.state, RunState::Running);
}

#[test]
fn progress_and_target_placeholders() {
    let mut view = ClientViewModel::new();
    assert_eq!(view.progress_percent(), 0.0);
    assert_eq!(view.display_target(), None);

    view.apply(&status(RunState::Running, 30.0, 100.0, 120.0));
    assert_eq!(view.progress_percent(), 25.0);
    assert_eq!(view.remaining_seconds(), Some(90.0));
    assert_eq!(view.display_target(), Some(120.0));

    view.apply(&status(RunState::Complete, 121.0, 480.0, 0.0));
    assert_eq!(view.display_target(), None);
    assert_eq!(view.progress_percent(), 100.0);
}

#[test]
fn cost_label_uses_configured_currency() {
    let mut view = ClientViewModel::new();
    view.apply(&ServerEvent::GetConfig(ConfigSnapshot {
        temp_scale: TempScale::Celsius,
        time_scale_slope: TimeScale::Hours,
        time_scale_profile: TimeScale::Minutes,
        kwh_rate: 0.2,
        currency_type: "€".into(),
        kp: 1.0,
        ki: 0.02,
        kd: 30.0,
    }));
    view.apply(&status(RunState::Running, 1.0, 20.0, 25.0));
    assert_eq!(view.cost_label(), "€0.42");
}

#[test]
fn completion_and_errors_become_notices() {
    let mut view = ClientViewModel::new();
    let done = RunCompleted {
        state: RunState::Complete,
        mode: RunMode::Simulate,
        is_simulation: true,
        message: "Simulation Complete".into(),
        cost: 1.5,
        time_stamp: 120.0,
    };
    assert_eq!(
        view.apply(&ServerEvent::RunCompleted(done.clone())),
        Some(Notice::RunFinished(done))
    );

    let error = ApiError::new(ErrorCode::Busy, "a run is already in progress");
    assert_eq!(
        view.apply(&ServerEvent::Error(error.clone())),
        Some(Notice::Error(error))
    );
}
