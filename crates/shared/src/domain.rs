use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One `(time_offset_seconds, target_temperature)` point of a firing schedule.
///
/// On the wire a waypoint is the two-element array `[t, T]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, f64)", into = "(u64, f64)")]
pub struct Waypoint {
    pub time_offset: u64,
    pub temperature: f64,
}

impl Waypoint {
    pub fn new(time_offset: u64, temperature: f64) -> Self {
        Self {
            time_offset,
            temperature,
        }
    }
}

impl From<(u64, f64)> for Waypoint {
    fn from((time_offset, temperature): (u64, f64)) -> Self {
        Self::new(time_offset, temperature)
    }
}

impl From<Waypoint> for (u64, f64) {
    fn from(value: Waypoint) -> Self {
        (value.time_offset, value.temperature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile name cannot be empty")]
    EmptyName,
    #[error("profile '{name}' has no waypoints")]
    NoWaypoints { name: String },
    #[error(
        "profile '{name}' goes back in time at point {index} ({current}s after {previous}s); an oven is not a time machine"
    )]
    NonIncreasing {
        name: String,
        index: usize,
        previous: u64,
        current: u64,
    },
    #[error("profile '{name}' has a non-finite temperature at point {index}")]
    NonFiniteTemperature { name: String, index: usize },
}

/// A named firing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub data: Vec<Waypoint>,
}

impl Profile {
    pub fn new(name: impl Into<String>, data: impl IntoIterator<Item = (u64, f64)>) -> Self {
        Self {
            name: name.into(),
            data: data.into_iter().map(Waypoint::from).collect(),
        }
    }

    /// Checks the invariants every stored or executed profile must hold:
    /// a name, at least one waypoint, strictly increasing offsets.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.data.is_empty() {
            return Err(ProfileError::NoWaypoints {
                name: self.name.clone(),
            });
        }
        for (index, point) in self.data.iter().enumerate() {
            if !point.temperature.is_finite() {
                return Err(ProfileError::NonFiniteTemperature {
                    name: self.name.clone(),
                    index,
                });
            }
        }
        for (index, pair) in self.data.windows(2).enumerate() {
            if pair[1].time_offset <= pair[0].time_offset {
                return Err(ProfileError::NonIncreasing {
                    name: self.name.clone(),
                    index: index + 1,
                    previous: pair[0].time_offset,
                    current: pair[1].time_offset,
                });
            }
        }
        Ok(())
    }

    /// Offset of the last waypoint, in seconds.
    pub fn duration_seconds(&self) -> u64 {
        self.data.last().map(|p| p.time_offset).unwrap_or_default()
    }

    pub fn temperature_bounds(&self) -> Option<(f64, f64)> {
        let mut points = self.data.iter().map(|p| p.temperature);
        let first = points.next()?;
        Some(points.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Run,
    Simulate,
}

impl RunMode {
    pub fn is_simulation(self) -> bool {
        matches!(self, RunMode::Simulate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Run => "RUN",
            RunMode::Simulate => "SIMULATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUN" => Some(RunMode::Run),
            "SIMULATE" => Some(RunMode::Simulate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Complete,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Complete => "COMPLETE",
            RunState::Aborted => "ABORTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IDLE" => Some(RunState::Idle),
            "RUNNING" => Some(RunState::Running),
            "COMPLETE" => Some(RunState::Complete),
            "ABORTED" => Some(RunState::Aborted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TempScale {
    #[default]
    #[serde(rename = "c", alias = "C")]
    Celsius,
    #[serde(rename = "f", alias = "F")]
    Fahrenheit,
}

impl TempScale {
    /// Expresses a Celsius value in this scale.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            TempScale::Celsius => celsius,
            TempScale::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeScale {
    #[serde(rename = "s", alias = "S")]
    Seconds,
    #[default]
    #[serde(rename = "m", alias = "M")]
    Minutes,
    #[serde(rename = "h", alias = "H")]
    Hours,
}

impl TimeScale {
    pub fn seconds(self) -> f64 {
        match self {
            TimeScale::Seconds => 1.0,
            TimeScale::Minutes => 60.0,
            TimeScale::Hours => 3600.0,
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
