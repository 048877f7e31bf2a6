//! Per-connection view of the kiln, rebuilt by folding server events.

use crate::{
    domain::{Profile, RunState},
    error::ApiError,
    protocol::{ConfigSnapshot, RunCompleted, ServerEvent, ServerResponse, StatusSnapshot},
};

/// Something a front end should surface to the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    RunFinished(RunCompleted),
    Response(ServerResponse),
    Error(ApiError),
}

#[derive(Debug, Clone, Default)]
pub struct ClientViewModel {
    pub state: RunState,
    pub status: Option<StatusSnapshot>,
    pub config: Option<ConfigSnapshot>,
    pub profiles: Vec<Profile>,
    pub run_profile: Option<Profile>,
    /// `(time_stamp, temperature)` samples of the current or last run.
    pub live: Vec<(f64, f64)>,
}

impl ClientViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ServerEvent) -> Option<Notice> {
        match event {
            ServerEvent::OvenUpdate(status) => {
                if self.state != RunState::Running && status.state == RunState::Running {
                    self.live.clear();
                }
                if status.state != RunState::Idle {
                    self.live.push((status.time_stamp, status.temperature));
                }
                self.state = status.state;
                self.status = Some(status.clone());
                None
            }
            ServerEvent::BacklogData(backlog) => {
                self.run_profile = backlog.profile.clone();
                self.live = backlog
                    .log
                    .iter()
                    .map(|entry| (entry.time_stamp, entry.temperature))
                    .collect();
                None
            }
            ServerEvent::GetConfig(config) => {
                self.config = Some(config.clone());
                None
            }
            ServerEvent::ProfileList(profiles) => {
                self.profiles = profiles.clone();
                None
            }
            ServerEvent::RunCompleted(done) => Some(Notice::RunFinished(done.clone())),
            ServerEvent::ServerResponse(response) => Some(Notice::Response(response.clone())),
            ServerEvent::Error(error) => Some(Notice::Error(error.clone())),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        match &self.status {
            Some(status) if status.total_time > 0 && status.state != RunState::Idle => {
                (status.time_stamp / status.total_time as f64 * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Seconds left in the schedule, negative once the run has overrun it.
    pub fn remaining_seconds(&self) -> Option<f64> {
        let status = self.status.as_ref()?;
        (status.state != RunState::Idle).then(|| status.total_time as f64 - status.time_stamp)
    }

    /// `None` stands for the `---` placeholder shown when there is no target.
    pub fn display_target(&self) -> Option<f64> {
        self.status
            .as_ref()
            .map(|s| s.target)
            .filter(|target| *target != 0.0)
    }

    pub fn cost_label(&self) -> String {
        let currency = self
            .config
            .as_ref()
            .map(|c| c.currency_type.as_str())
            .unwrap_or("$");
        let cost = self.status.as_ref().map(|s| s.cost).unwrap_or_default();
        format!("{currency}{cost:.2}")
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
