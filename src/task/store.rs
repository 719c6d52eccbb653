// src/task/store.rs

//! Persistence boundary for task snapshots.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;

use super::snapshot::TaskSnapshot;

/// File name of the JSON store inside the data directory.
pub const TASKS_FILE: &str = "tasks.json";

/// Loads and saves the full list of task snapshots.
pub trait TaskStore: Send + Sync + Debug {
    fn load(&self) -> Result<Vec<TaskSnapshot>>;
    fn save(&self, tasks: &[TaskSnapshot]) -> Result<()>;

    /// Replace the snapshot with the same uuid, or append it.
    fn upsert(&self, snapshot: TaskSnapshot) -> Result<()> {
        let mut tasks = self.load()?;
        match tasks.iter_mut().find(|t| t.uuid == snapshot.uuid) {
            Some(existing) => *existing = snapshot,
            None => tasks.push(snapshot),
        }
        self.save(&tasks)
    }
}

/// Store kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<TaskSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    fn load(&self) -> Result<Vec<TaskSnapshot>> {
        Ok(self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, tasks: &[TaskSnapshot]) -> Result<()> {
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = tasks.to_vec();
        Ok(())
    }
}

/// Store backed by a pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    /// `<data_dir>/tasks.json`.
    pub fn in_data_dir(fs: Arc<dyn FileSystem>, data_dir: &Path) -> Self {
        Self::new(fs, data_dir.join(TASKS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonFileStore {
    fn load(&self) -> Result<Vec<TaskSnapshot>> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no task store yet");
            return Ok(Vec::new());
        }
        let contents = self.fs.read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, tasks: &[TaskSnapshot]) -> Result<()> {
        let json = serde_json::to_vec_pretty(tasks)?;
        self.fs.write(&self.path, &json)?;
        debug!(path = ?self.path, tasks = tasks.len(), "saved task store");
        Ok(())
    }
}
