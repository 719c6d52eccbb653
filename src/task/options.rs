// src/task/options.rs

//! Reduction of the caller's `{name, value}` options into the flat mapping
//! handed to the worker.
//!
//! Caller options are applied in order (a repeated name keeps its last
//! value), then the computed keys are added. Computed keys are reserved: a
//! caller supplying one is rejected when the task is created.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::errors::{Result, TaskError};
use crate::types::TaskOption;

pub const PROJECT_PATH: &str = "project-path";
pub const CORES_HINT: &str = "pmvs-num-cores";
pub const USE_GCP: &str = "odm_georeferencing-useGcp";
pub const GCP_FILE: &str = "odm_georeferencing-gcpFile";

/// Keys computed at start time.
pub const RESERVED_KEYS: &[&str] = &[PROJECT_PATH, CORES_HINT, USE_GCP, GCP_FILE];

/// Reject caller options that collide with computed keys.
pub fn check_reserved(options: &[TaskOption]) -> Result<()> {
    match options
        .iter()
        .find(|opt| RESERVED_KEYS.contains(&opt.name.as_str()))
    {
        Some(opt) => Err(TaskError::ReservedOption(opt.name.clone())),
        None => Ok(()),
    }
}

/// Values the task computes for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedOptions {
    /// Canonical data directory; the worker appends the task id to it.
    pub project_path: PathBuf,
    pub cores: usize,
    /// First ground control file, if any were found.
    pub gcp_file: Option<PathBuf>,
}

/// Flat option mapping, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerOptions {
    values: BTreeMap<String, Value>,
}

impl WorkerOptions {
    pub fn reduce(caller: &[TaskOption], computed: &ComputedOptions) -> Result<Self> {
        check_reserved(caller)?;

        let mut values: BTreeMap<String, Value> = caller
            .iter()
            .map(|opt| (opt.name.clone(), opt.value.clone()))
            .collect();

        values.insert(
            PROJECT_PATH.to_string(),
            Value::String(computed.project_path.to_string_lossy().into_owned()),
        );
        values.insert(CORES_HINT.to_string(), Value::from(computed.cores));
        if let Some(gcp) = &computed.gcp_file {
            values.insert(USE_GCP.to_string(), Value::Bool(true));
            values.insert(
                GCP_FILE.to_string(),
                Value::String(gcp.to_string_lossy().into_owned()),
            );
        }

        Ok(Self { values })
    }

    /// `--name value` pairs. `true` becomes a bare flag; `false` and `null`
    /// are left out.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.values.len() * 2);
        for (name, value) in &self.values {
            match value {
                Value::Bool(false) | Value::Null => {}
                Value::Bool(true) => args.push(format!("--{name}")),
                Value::String(s) => {
                    args.push(format!("--{name}"));
                    args.push(s.clone());
                }
                other => {
                    args.push(format!("--{name}"));
                    args.push(other.to_string());
                }
            }
        }
        args
    }
}
