// src/pipeline/stage.rs

//! Named asynchronous stages and the sequential runner.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{Result, TaskError};
use crate::exec::{CommandSpec, OutputSink, ProcessControl, ProcessLauncher};

type StageFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// One unit of post-processing.
///
/// The body is `FnOnce`: a stage runs at most once and settles exactly once,
/// with whatever its future resolves to.
pub struct Stage {
    name: String,
    body: Box<dyn FnOnce() -> StageFuture + Send>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(move || -> StageFuture { Box::pin(body()) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a stage sequence ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage succeeded.
    Completed,
    /// `stage` failed; later stages never started.
    Failed { stage: String, error: TaskError },
    /// The owner was canceled before `next_stage` could start.
    Canceled { next_stage: String },
}

/// Run `stages` strictly in order.
///
/// Stage N+1 starts only after stage N succeeded. `is_canceled` is checked
/// before each stage; the first failure or observed cancellation ends the
/// run.
pub async fn run_stages<C>(stages: Vec<Stage>, is_canceled: C) -> PipelineOutcome
where
    C: Fn() -> bool,
{
    let total = stages.len();

    for (index, stage) in stages.into_iter().enumerate() {
        let Stage { name, body } = stage;

        if is_canceled() {
            info!(stage = %name, "canceled before stage; stopping pipeline");
            return PipelineOutcome::Canceled { next_stage: name };
        }

        debug!(stage = %name, index, total, "starting stage");
        if let Err(error) = body().await {
            if is_canceled() {
                debug!(stage = %name, error = %error, "stage ended after cancel");
            } else {
                warn!(stage = %name, error = %error, "stage failed; aborting pipeline");
            }
            return PipelineOutcome::Failed { stage: name, error };
        }
        debug!(stage = %name, "stage finished");
    }

    PipelineOutcome::Completed
}

/// Registry of running processes owned by a task.
pub trait ProcessTracker: Send + Sync {
    /// Register a freshly launched process and return a key for
    /// [`release`](Self::release).
    ///
    /// Returns `None` when the owner no longer accepts processes (it was
    /// canceled in the meantime); the tracker terminates `control` itself in
    /// that case.
    fn track(&self, control: Arc<dyn ProcessControl>) -> Option<u64>;

    /// Forget a process that has exited.
    fn release(&self, key: u64);
}

/// Launch `spec`, keep it registered with `tracker` while it runs, and map
/// a non-zero exit to an error.
pub async fn run_supervised(
    launcher: &dyn ProcessLauncher,
    spec: &CommandSpec,
    output: OutputSink,
    tracker: &dyn ProcessTracker,
) -> Result<()> {
    info!(command = %spec, "running tool");
    let handle = launcher.launch(spec, output)?;
    let key = tracker.track(handle.control());

    let report = handle.wait().await;
    if let Some(key) = key {
        tracker.release(key);
    }

    report?.into_result()
}
