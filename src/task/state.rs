// src/task/state.rs

//! Pure task state machine.
//!
//! [`TaskState`] owns everything a transition may touch: status, creation
//! time, captured output, the processing clock and the set of running
//! processes. Every method is synchronous and takes the current time as an
//! argument, so the transition table is unit tested without Tokio or real
//! processes. The async shell in `task/mod.rs` holds it behind a mutex.
//!
//! Runs are numbered. `begin_run` and `restart` each open a new run number;
//! output, process registrations and outcomes tagged with an older number
//! are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::errors::{Result, TaskError};
use crate::exec::ProcessControl;
use crate::types::TaskStatus;

use super::clock::ProcessingClock;

/// Identifies one `start` of a task.
pub type RunId = u64;

#[derive(Debug)]
pub struct TaskState {
    status: TaskStatus,
    date_created: DateTime<Utc>,
    output: Vec<String>,
    clock: ProcessingClock,
    run: RunId,
    processes: HashMap<u64, Arc<dyn ProcessControl>>,
    next_process_key: u64,
}

impl TaskState {
    pub fn new(status: TaskStatus, date_created: DateTime<Utc>) -> Self {
        Self {
            status,
            date_created,
            output: Vec::new(),
            clock: ProcessingClock::default(),
            run: 0,
            processes: HashMap::new(),
            next_process_key: 0,
        }
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn processing_time(&self, now: Instant) -> i64 {
        self.clock.elapsed_ms(now)
    }

    pub fn running_process_count(&self) -> usize {
        self.processes.len()
    }

    /// True while `run` is the active run and the task is still RUNNING.
    pub fn is_active(&self, run: RunId) -> bool {
        run == self.run && self.status == TaskStatus::Running
    }

    /// QUEUED -> RUNNING. Returns the new run id, or `None` when the task is
    /// not QUEUED.
    pub fn begin_run(&mut self, now: Instant) -> Option<RunId> {
        if self.status != TaskStatus::Queued {
            return None;
        }
        self.run += 1;
        self.status = TaskStatus::Running;
        self.clock.start(now);
        Some(self.run)
    }

    /// Settle `run` with a terminal `outcome`.
    ///
    /// Ignored (returns `false`) when the run is no longer active, which is
    /// how a cancel wins over a concurrently finishing run.
    pub fn finish(&mut self, run: RunId, outcome: TaskStatus, now: Instant) -> bool {
        if !self.is_active(run) {
            return false;
        }
        self.status = outcome;
        self.clock.stop(now);
        self.processes.clear();
        true
    }

    /// Any state but CANCELED -> CANCELED.
    ///
    /// Returns the processes to interrupt: everything registered when the
    /// task was RUNNING, nothing otherwise. The caller signals them after
    /// releasing its lock.
    pub fn cancel(&mut self) -> Result<Vec<Arc<dyn ProcessControl>>> {
        if self.status == TaskStatus::Canceled {
            return Err(TaskError::AlreadyCanceled);
        }
        let was_running = self.status == TaskStatus::Running;
        self.status = TaskStatus::Canceled;
        self.clock.reset();

        if was_running {
            Ok(self.processes.drain().map(|(_, control)| control).collect())
        } else {
            Ok(Vec::new())
        }
    }

    /// FAILED | COMPLETED | CANCELED -> QUEUED, with fresh creation time,
    /// empty output and an untracked clock.
    pub fn restart(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_terminal() {
            return Err(TaskError::CannotRestart);
        }
        self.run += 1;
        self.status = TaskStatus::Queued;
        self.date_created = now;
        self.output.clear();
        self.clock.reset();
        Ok(())
    }

    /// Register a process launched by `run`.
    ///
    /// Returns `None` when `run` is no longer active; the caller must then
    /// terminate the process itself.
    pub fn track(&mut self, run: RunId, control: Arc<dyn ProcessControl>) -> Option<u64> {
        if !self.is_active(run) {
            return None;
        }
        let key = self.next_process_key;
        self.next_process_key += 1;
        self.processes.insert(key, control);
        Some(key)
    }

    pub fn release(&mut self, key: u64) {
        self.processes.remove(&key);
    }

    /// Append a chunk produced by `run`. Chunks from before the latest
    /// restart are dropped.
    pub fn append_output(&mut self, run: RunId, chunk: String) {
        if run == self.run {
            self.output.push(chunk);
        }
    }

    /// Chunks from index `from` on; empty when `from` is past the end.
    pub fn output_from(&self, from: usize) -> Vec<String> {
        self.output.get(from..).map(<[String]>::to_vec).unwrap_or_default()
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }
}
