use super::*;

fn ramp() -> Profile {
    Profile::new("ramp", [(0, 25.0), (60, 25.0), (120, 500.0)])
}

#[test]
fn holds_first_and_last_temperatures_outside_the_schedule() {
    let profile = Profile::new("late", [(30, 100.0), (90, 400.0)]);
    assert_eq!(target_at(&profile, 0.0), 100.0);
    assert_eq!(target_at(&profile, 30.0), 100.0);
    assert_eq!(target_at(&profile, 90.0), 400.0);
    assert_eq!(target_at(&profile, 10_000.0), 400.0);
}

#[test]
fn interpolates_linearly_between_waypoints() {
    let profile = ramp();
    assert_eq!(target_at(&profile, 30.0), 25.0);
    assert_eq!(target_at(&profile, 60.0), 25.0);
    assert!((target_at(&profile, 90.0) - 262.5).abs() < 1e-9);
    assert!((target_at(&profile, 119.0) - (25.0 + 475.0 * 59.0 / 60.0)).abs() < 1e-9);
}

#[test]
fn is_exact_at_waypoints_and_bounded_between_them() {
    let profile = Profile::new(
        "cone 04",
        [(0, 20.0), (3600, 600.0), (5400, 580.0), (9000, 1060.0)],
    );
    for point in &profile.data {
        assert_eq!(target_at(&profile, point.time_offset as f64), point.temperature);
    }
    let (lo, hi) = profile.temperature_bounds().expect("bounds");
    for second in (0..=9_500).step_by(7) {
        let target = target_at(&profile, second as f64);
        assert!(target >= lo && target <= hi, "{target} outside [{lo}, {hi}]");
    }
}

#[test]
fn single_waypoint_profiles_hold_their_temperature() {
    let profile = Profile::new("soak", [(0, 250.0)]);
    assert_eq!(target_at(&profile, 0.0), 250.0);
    assert_eq!(target_at(&profile, 42.0), 250.0);
}

#[test]
fn empty_profiles_have_no_target() {
    let profile = Profile::new("empty", Vec::<(u64, f64)>::new());
    assert_eq!(target_at(&profile, 5.0), 0.0);
}

#[test]
fn slopes_are_reported_in_the_requested_unit() {
    let profile = ramp();
    let close = |value: Option<f64>, expected: f64| {
        let value = value.expect("segment exists");
        assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
    };
    close(slope_at(&profile, 0, TimeScale::Hours), 0.0);
    close(slope_at(&profile, 1, TimeScale::Seconds), 475.0 / 60.0);
    close(slope_at(&profile, 1, TimeScale::Minutes), 475.0);
    close(slope_at(&profile, 1, TimeScale::Hours), 475.0 * 60.0);
    assert_eq!(slope_at(&profile, 2, TimeScale::Hours), None);

    let slopes = segment_slopes(&profile, TimeScale::Minutes);
    assert_eq!(slopes.len(), 2);
    close(slopes.last().copied(), 475.0);
}

#[test]
fn cost_estimate_assumes_full_power_for_the_whole_schedule() {
    let config = KilnConfig {
        heater_power_watts: 4000.0,
        kwh_rate: 0.25,
        ..KilnConfig::default()
    };
    let profile = Profile::new("two hours", [(0, 20.0), (7200, 900.0)]);
    assert!((estimate_cost(&profile, &config) - 2.0).abs() < 1e-12);
}
