use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Profile, RunId, RunMode, RunState, TempScale, TimeScale},
    error::{ApiError, Severity},
};

/// Commands a client sends over the control socket, tagged by `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    Run {
        profile: Profile,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_at_seconds: Option<u64>,
    },
    Simulate {
        profile: Profile,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_at_seconds: Option<u64>,
    },
    Stop,
    Put {
        profile: Profile,
        #[serde(default)]
        force: bool,
    },
    Delete {
        #[serde(alias = "profile")]
        name: String,
    },
    GetConfig,
    GetBacklog,
    GetProfiles,
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidStats {
    pub error: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub output: f64,
}

/// Telemetry published every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub temperature: f64,
    pub target: f64,
    pub heat: f64,
    pub time_stamp: f64,
    pub total_time: u64,
    pub cost: f64,
    pub is_simulation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_stats: Option<PidStats>,
}

impl StatusSnapshot {
    pub fn idle(temperature: f64) -> Self {
        Self {
            state: RunState::Idle,
            temperature,
            target: 0.0,
            heat: 0.0,
            time_stamp: 0.0,
            total_time: 0,
            cost: 0.0,
            is_simulation: false,
            profile: None,
            pid_stats: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time_stamp: f64,
    pub temperature: f64,
    pub target: f64,
    pub heat: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Backlog {
    pub profile: Option<Profile>,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub temp_scale: TempScale,
    pub time_scale_slope: TimeScale,
    pub time_scale_profile: TimeScale,
    pub kwh_rate: f64,
    pub currency_type: String,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub status: ResponseStatus,
    pub message: String,
    pub severity: Severity,
}

impl ServerResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            severity: Severity::Info,
        }
    }
}

/// Edge-triggered notice sent once when a run leaves RUNNING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub state: RunState,
    pub mode: RunMode,
    pub is_simulation: bool,
    pub message: String,
    pub cost: f64,
    pub time_stamp: f64,
}

/// One journaled run as listed by the history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub profile: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub final_state: Option<RunState>,
    pub energy_kwh: Option<f64>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    OvenUpdate(StatusSnapshot),
    BacklogData(Backlog),
    GetConfig(ConfigSnapshot),
    ProfileList(Vec<Profile>),
    RunCompleted(RunCompleted),
    ServerResponse(ServerResponse),
    Error(ApiError),
}
