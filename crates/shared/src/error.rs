use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Busy,
    InvalidProfile,
    Conflict,
    NotFound,
    HazardExceeded,
    TransportError,
    Internal,
}

impl ErrorCode {
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCode::Busy | ErrorCode::Conflict => Severity::Warning,
            ErrorCode::HazardExceeded => Severity::Critical,
            ErrorCode::InvalidProfile
            | ErrorCode::NotFound
            | ErrorCode::TransportError
            | ErrorCode::Internal => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.default_severity(),
        }
    }
}
