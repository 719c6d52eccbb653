// src/types.rs

//! Small shared value types: status codes, task status and task options.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric status codes as they appear in serialized task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Queued = 10,
    Running = 20,
    Failed = 30,
    Completed = 40,
    Canceled = 50,
}

impl StatusCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            10 => Ok(StatusCode::Queued),
            20 => Ok(StatusCode::Running),
            30 => Ok(StatusCode::Failed),
            40 => Ok(StatusCode::Completed),
            50 => Ok(StatusCode::Canceled),
            other => Err(format!(
                "invalid status code: {other} (expected one of 10, 20, 30, 40, 50)"
            )),
        }
    }
}

/// Lifecycle status of a task.
///
/// Only `Failed` carries a payload: the human-readable reason attached by the
/// transition that produced it. On the wire this is `{"code": 30,
/// "errorMessage": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStatus", into = "RawStatus")]
pub enum TaskStatus {
    Queued,
    Running,
    Failed { error_message: Option<String> },
    Completed,
    Canceled,
}

impl TaskStatus {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskStatus::Failed {
            error_message: Some(message.into()),
        }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            TaskStatus::Queued => StatusCode::Queued,
            TaskStatus::Running => StatusCode::Running,
            TaskStatus::Failed { .. } => StatusCode::Failed,
            TaskStatus::Completed => StatusCode::Completed,
            TaskStatus::Canceled => StatusCode::Canceled,
        }
    }

    /// FAILED, COMPLETED and CANCELED.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Failed { .. } | TaskStatus::Completed | TaskStatus::Canceled
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed { error_message } => error_message.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Failed { .. } => "FAILED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Canceled => "CANCELED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStatus {
    code: u8,
    #[serde(
        default,
        rename = "errorMessage",
        skip_serializing_if = "Option::is_none"
    )]
    error_message: Option<String>,
}

impl TryFrom<RawStatus> for TaskStatus {
    type Error = String;

    fn try_from(raw: RawStatus) -> Result<Self, Self::Error> {
        Ok(match StatusCode::try_from(raw.code)? {
            StatusCode::Queued => TaskStatus::Queued,
            StatusCode::Running => TaskStatus::Running,
            StatusCode::Failed => TaskStatus::Failed {
                error_message: raw.error_message,
            },
            StatusCode::Completed => TaskStatus::Completed,
            StatusCode::Canceled => TaskStatus::Canceled,
        })
    }
}

impl From<TaskStatus> for RawStatus {
    fn from(status: TaskStatus) -> Self {
        let code = status.code().as_u8();
        let error_message = match status {
            TaskStatus::Failed { error_message } => error_message,
            _ => None,
        };
        RawStatus {
            code,
            error_message,
        }
    }
}

/// A single `{name, value}` option forwarded to the worker process.
///
/// Values are kept as raw JSON so they round-trip through persistence
/// exactly as the caller supplied them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOption {
    pub name: String,
    pub value: serde_json::Value,
}

impl TaskOption {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
