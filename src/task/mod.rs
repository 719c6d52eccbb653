// src/task/mod.rs

//! The task aggregate.
//!
//! A [`Task`] is a cheap, clonable handle around shared state:
//!
//! - immutable inputs fixed at construction (id, name, options, the scan of
//!   the working directory);
//! - a [`state::TaskState`] behind a mutex, holding everything transitions
//!   mutate.
//!
//! `start` flips the task to RUNNING synchronously and then drives the run on
//! a Tokio task: the worker first, then the post-processing stages, all
//! through the sequential runner in [`crate::pipeline`]. `cancel` and
//! `restart` act on the state directly and never wait for processes to exit.
//! Mutex guards are never held across an `.await` or while signalling a
//! process.

pub mod assets;
pub mod clock;
pub mod discovery;
pub mod options;
pub mod snapshot;
pub mod state;
pub mod store;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::errors::{Result, TaskError};
use crate::exec::ansi::ColorStripper;
use crate::exec::{
    CommandSpec, OutputSink, ProcessControl, ProcessLauncher, TermSignal, TokioLauncher, commands,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{
    PipelineOutcome, PostProcessContext, ProcessTracker, Stage, post_process_stages, run_stages,
    run_supervised,
};
use crate::types::{TaskOption, TaskStatus};

pub use assets::resolve_asset;
pub use clock::UNTRACKED;
pub use discovery::Discovery;
pub use options::{ComputedOptions, RESERVED_KEYS, WorkerOptions};
pub use snapshot::{TaskInfo, TaskSnapshot};
pub use state::{RunId, TaskState};
pub use store::{JsonFileStore, MemoryStore, TaskStore};

/// Name of the stage that runs the ODM worker itself.
pub const WORKER_STAGE: &str = "worker";

/// Collaborators shared by every task of a runner.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub config: RunnerConfig,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub fs: Arc<dyn FileSystem>,
}

impl TaskContext {
    /// Real processes and the real filesystem.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(TokioLauncher::new()),
            fs: Arc::new(RealFileSystem),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Concurrency hint for the worker: `max_cores` if configured, else the
    /// machine's available parallelism.
    pub fn cores(&self) -> usize {
        self.config.runner.max_cores.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Handle to one processing job. Clones share the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    uuid: String,
    name: String,
    options: Vec<TaskOption>,
    project_dir: PathBuf,
    discovery: Discovery,
    ctx: Arc<TaskContext>,
    state: Mutex<TaskState>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("uuid", &self.inner.uuid)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Create a QUEUED task over `<data_dir>/<uuid>`.
    ///
    /// Fails when the working directory or its `images/` subdirectory is
    /// missing, or when `options` names a reserved key. An empty `name` is
    /// replaced by one derived from the creation time.
    pub fn create(
        uuid: impl Into<String>,
        name: impl Into<String>,
        options: Vec<TaskOption>,
        ctx: Arc<TaskContext>,
    ) -> Result<Self> {
        Self::build(
            uuid.into(),
            name.into(),
            options,
            TaskStatus::Queued,
            Utc::now(),
            ctx,
        )
    }

    /// Rebuild a task from persisted state.
    ///
    /// The working directory is scanned again. A task saved while RUNNING
    /// comes back QUEUED: its processes did not survive.
    pub fn from_snapshot(snapshot: TaskSnapshot, ctx: Arc<TaskContext>) -> Result<Self> {
        let status = match snapshot.status {
            TaskStatus::Running => {
                info!(task = %snapshot.uuid, "task was running when saved; requeueing");
                TaskStatus::Queued
            }
            other => other,
        };
        Self::build(
            snapshot.uuid,
            snapshot.name,
            snapshot.options,
            status,
            snapshot.date_created,
            ctx,
        )
    }

    fn build(
        uuid: String,
        name: String,
        options: Vec<TaskOption>,
        status: TaskStatus,
        date_created: DateTime<Utc>,
        ctx: Arc<TaskContext>,
    ) -> Result<Self> {
        options::check_reserved(&options)?;
        check_task_id(&uuid, &ctx.config.runner.data_dir)?;

        let project_dir = ctx.config.task_dir(&uuid);
        let discovery = discovery::discover(ctx.fs.as_ref(), &project_dir)?;
        let name = if name.is_empty() {
            snapshot::default_name(date_created)
        } else {
            name
        };

        info!(
            task = %uuid,
            name = %name,
            status = %status,
            images = discovery.images.len(),
            "task created"
        );

        Ok(Self {
            inner: Arc::new(TaskInner {
                uuid,
                name,
                options,
                project_dir,
                discovery,
                ctx,
                state: Mutex::new(TaskState::new(status, date_created)),
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &[TaskOption] {
        &self.inner.options
    }

    pub fn project_dir(&self) -> &Path {
        &self.inner.project_dir
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.inner.discovery.images
    }

    pub fn ground_control_files(&self) -> &[PathBuf] {
        &self.inner.discovery.ground_control_files
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_state().status().clone()
    }

    pub fn running_process_count(&self) -> usize {
        self.lock_state().running_process_count()
    }

    /// Start processing. Only a QUEUED task starts; otherwise returns `None`
    /// and nothing changes.
    ///
    /// The task is RUNNING when this returns. The returned handle resolves
    /// once the run settled (or was superseded). Must be called from within
    /// a Tokio runtime.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let begun = self.lock_state().begin_run(Instant::now());
        let Some(run) = begun else {
            debug!(task = %self.inner.uuid, status = %self.status(), "not started; task is not queued");
            return None;
        };

        info!(task = %self.inner.uuid, run, "task started");
        let task = self.clone();
        Some(tokio::spawn(async move { task.drive(run).await }))
    }

    async fn drive(self, run: RunId) {
        let outcome = match self.stages(run) {
            Ok(stages) => run_stages(stages, || !self.is_active(run)).await,
            Err(error) => PipelineOutcome::Failed {
                stage: WORKER_STAGE.to_string(),
                error,
            },
        };

        let status = match outcome {
            PipelineOutcome::Completed => TaskStatus::Completed,
            PipelineOutcome::Failed { stage, error } => {
                if !self.is_active(run) {
                    debug!(
                        task = %self.inner.uuid,
                        stage = %stage,
                        error = %error,
                        "canceled run exited"
                    );
                    return;
                }
                warn!(task = %self.inner.uuid, stage = %stage, error = %error, "run failed");
                TaskStatus::failed(error.to_string())
            }
            PipelineOutcome::Canceled { next_stage } => {
                info!(task = %self.inner.uuid, next_stage = %next_stage, "run stopped by cancel");
                return;
            }
        };

        let applied = self
            .lock_state()
            .finish(run, status.clone(), Instant::now());
        if applied {
            info!(task = %self.inner.uuid, status = %status, "task finished");
        } else {
            debug!(task = %self.inner.uuid, run, "run no longer active; outcome dropped");
        }
    }

    fn is_active(&self, run: RunId) -> bool {
        self.lock_state().is_active(run)
    }

    /// The worker command line for the next run.
    pub fn worker_command(&self) -> Result<CommandSpec> {
        let ctx = &self.inner.ctx;
        let gcp_file = match self.inner.discovery.ground_control_files.first() {
            Some(path) => Some(ctx.fs.canonicalize(path)?),
            None => None,
        };
        let computed = ComputedOptions {
            project_path: ctx.fs.canonicalize(&ctx.config.runner.data_dir)?,
            cores: ctx.cores(),
            gcp_file,
        };
        let options = WorkerOptions::reduce(&self.inner.options, &computed)?;

        Ok(commands::worker_command(
            &ctx.config.runner,
            options.to_args(),
            &self.inner.uuid,
        ))
    }

    /// Worker stage followed by the post-processing stages.
    fn stages(&self, run: RunId) -> Result<Vec<Stage>> {
        let ctx = &self.inner.ctx;
        let worker = self.worker_command()?;
        let output = self.output_sink(run)?;
        let tracker: Arc<dyn ProcessTracker> = Arc::new(RunTracker {
            task: self.clone(),
            run,
        });

        let mut stages = Vec::with_capacity(8);

        let launcher = Arc::clone(&ctx.launcher);
        let worker_output = Arc::clone(&output);
        let worker_tracker = Arc::clone(&tracker);
        stages.push(Stage::new(WORKER_STAGE, move || async move {
            run_supervised(
                launcher.as_ref(),
                &worker,
                worker_output,
                worker_tracker.as_ref(),
            )
            .await
        }));

        stages.extend(post_process_stages(PostProcessContext {
            project_dir: self.inner.project_dir.clone(),
            source_root: assets::archive_source_root(&ctx.config.test, &self.inner.project_dir),
            tools: ctx.config.tools.clone(),
            launcher: Arc::clone(&ctx.launcher),
            output,
            tracker,
        }));

        Ok(stages)
    }

    fn output_sink(&self, run: RunId) -> Result<OutputSink> {
        let task = self.clone();
        let colors = ColorStripper::new()?;
        Ok(Arc::new(move |chunk: String| {
            let chunk = colors.strip(&chunk).into_owned();
            task.lock_state().append_output(run, chunk);
        }))
    }

    /// Cancel the task.
    ///
    /// The status is CANCELED when this returns. If the task was running,
    /// every registered process is sent an interrupt; they may take a while
    /// to actually exit.
    pub fn cancel(&self) -> Result<()> {
        let to_interrupt = self.lock_state().cancel()?;

        info!(
            task = %self.inner.uuid,
            processes = to_interrupt.len(),
            "task canceled"
        );
        for control in to_interrupt {
            control.terminate(TermSignal::Interrupt);
        }
        Ok(())
    }

    /// Requeue a FAILED, COMPLETED or CANCELED task with fresh output.
    ///
    /// The working directory is not scanned again.
    pub fn restart(&self) -> Result<()> {
        self.lock_state().restart(Utc::now())?;
        info!(task = %self.inner.uuid, "task restarted");
        Ok(())
    }

    pub fn info(&self) -> TaskInfo {
        let state = self.lock_state();
        TaskInfo {
            uuid: self.inner.uuid.clone(),
            name: self.inner.name.clone(),
            date_created: state.date_created(),
            processing_time: state.processing_time(Instant::now()),
            status: state.status().clone(),
            options: self.inner.options.clone(),
            images_count: self.inner.discovery.images.len(),
        }
    }

    /// Captured output from chunk index `from` on.
    pub fn output(&self, from: usize) -> Vec<String> {
        self.lock_state().output_from(from)
    }

    /// Path of a downloadable asset, or `None` for names outside the fixed
    /// set.
    pub fn asset_path(&self, name: &str) -> Option<PathBuf> {
        resolve_asset(&self.inner.ctx.config.test, &self.inner.project_dir, name)
    }

    pub fn serialize(&self) -> TaskSnapshot {
        let state = self.lock_state();
        TaskSnapshot {
            uuid: self.inner.uuid.clone(),
            name: self.inner.name.clone(),
            date_created: state.date_created(),
            status: state.status().clone(),
            options: self.inner.options.clone(),
        }
    }

    /// Delete the working directory. A running task is canceled first.
    pub fn cleanup(&self) -> Result<()> {
        if self.status() == TaskStatus::Running {
            self.cancel()?;
        }
        self.inner.ctx.fs.remove_dir_all(&self.inner.project_dir)?;
        info!(task = %self.inner.uuid, dir = ?self.inner.project_dir, "working directory removed");
        Ok(())
    }
}

/// A task id names exactly one directory directly under the data directory.
fn check_task_id(uuid: &str, data_dir: &Path) -> Result<()> {
    let mut components = Path::new(uuid).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == uuid => Ok(()),
        _ => Err(TaskError::Construction {
            path: data_dir.join(uuid),
            reason: format!("invalid task id {uuid:?}"),
        }),
    }
}

/// Registers a run's processes with its task.
struct RunTracker {
    task: Task,
    run: RunId,
}

impl ProcessTracker for RunTracker {
    fn track(&self, control: Arc<dyn ProcessControl>) -> Option<u64> {
        let key = self.task.lock_state().track(self.run, Arc::clone(&control));
        if key.is_none() {
            info!(
                task = %self.task.inner.uuid,
                program = control.label(),
                "task no longer running; interrupting late process"
            );
            control.terminate(TermSignal::Interrupt);
        }
        key
    }

    fn release(&self, key: u64) {
        self.task.lock_state().release(key);
    }
}
