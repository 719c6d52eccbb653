// src/task/snapshot.rs

//! Serialized forms of a task: the persisted snapshot and the info view.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskOption, TaskStatus};

/// Persisted task state.
///
/// Discovery results and running processes are deliberately absent; they are
/// recomputed or meaningless after a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub uuid: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_created: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub options: Vec<TaskOption>,
}

/// Status query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub uuid: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_created: DateTime<Utc>,
    /// Milliseconds, or -1 when not tracked.
    pub processing_time: i64,
    pub status: TaskStatus,
    pub options: Vec<TaskOption>,
    pub images_count: usize,
}

/// Name given to tasks created without one.
pub fn default_name(created: DateTime<Utc>) -> String {
    format!(
        "Task of {}",
        created.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
