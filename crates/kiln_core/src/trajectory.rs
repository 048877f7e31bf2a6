use shared::{
    config::KilnConfig,
    domain::{Profile, TimeScale},
};

/// Target temperature `elapsed_seconds` into the schedule.
///
/// Holds the first temperature before the first waypoint and the last one
/// after the schedule ends; linear in between. An empty profile has no
/// target and yields `0.0`.
pub fn target_at(profile: &Profile, elapsed_seconds: f64) -> f64 {
    let points = &profile.data;
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if elapsed_seconds <= first.time_offset as f64 {
        return first.temperature;
    }
    if elapsed_seconds >= last.time_offset as f64 {
        return last.temperature;
    }

    // first offset < elapsed < last offset, so 1 <= next < len
    let next = points.partition_point(|p| p.time_offset as f64 <= elapsed_seconds);
    let (a, b) = (points[next - 1], points[next]);
    let span = (b.time_offset - a.time_offset) as f64;
    a.temperature + (b.temperature - a.temperature) * (elapsed_seconds - a.time_offset as f64) / span
}

/// Ramp rate of the segment starting at `index`, in degrees per `unit`.
pub fn slope_at(profile: &Profile, index: usize, unit: TimeScale) -> Option<f64> {
    let a = profile.data.get(index)?;
    let b = profile.data.get(index + 1)?;
    let span = b.time_offset.checked_sub(a.time_offset).filter(|s| *s > 0)?;
    Some((b.temperature - a.temperature) / span as f64 * unit.seconds())
}

/// Ramp rates of every segment in order, one fewer than the waypoints.
pub fn segment_slopes(profile: &Profile, unit: TimeScale) -> Vec<f64> {
    (0..profile.data.len().saturating_sub(1))
        .filter_map(|index| slope_at(profile, index, unit))
        .collect()
}

/// Energy drawn by the element at `heat_fraction` duty for `seconds`.
pub fn energy_kwh(heater_power_watts: f64, heat_fraction: f64, seconds: f64) -> f64 {
    heater_power_watts * heat_fraction * seconds / 3600.0 / 1000.0
}

/// Worst-case cost of a schedule: the element on for its whole duration.
pub fn estimate_cost(profile: &Profile, config: &KilnConfig) -> f64 {
    energy_kwh(
        config.heater_power_watts,
        1.0,
        profile.duration_seconds() as f64,
    ) * config.kwh_rate
}

#[cfg(test)]
#[path = "tests/trajectory_tests.rs"]
mod tests;
