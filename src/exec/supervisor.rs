// src/exec/supervisor.rs

//! Launcher / handle abstraction for supervised external processes.
//!
//! The task never touches OS process handles. It asks a [`ProcessLauncher`]
//! to start a [`CommandSpec`], receives output chunks through an
//! [`OutputSink`], and gets back a [`ProcessHandle`] that can be waited on.
//! The handle's [`ProcessControl`] half is cloned into the task's set of
//! running processes so a cancel can reach it.
//!
//! Termination is best-effort: `terminate` only queues a signal for
//! delivery and returns immediately. The process may ignore or delay it, in
//! which case `wait` keeps pending until it actually exits. Escalating to a
//! hard kill after a grace period can be layered on top of `TermSignal::Kill`
//! without changing callers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::{Result, TaskError};

/// Callback receiving raw output chunks in arrival order.
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Signal requested by a `terminate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// SIGINT; lets the worker shut down on its own terms.
    Interrupt,
    /// Forceful kill.
    Kill,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitReport {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// `Ok(())` for exit code 0, otherwise the matching error.
    pub fn into_result(self) -> Result<()> {
        match (self.code, self.signal) {
            (Some(0), _) => Ok(()),
            (Some(code), _) => Err(TaskError::ExitCode(code)),
            (None, Some(signal)) => Err(TaskError::ExitSignal(signal)),
            (None, None) => Err(TaskError::ExitCode(-1)),
        }
    }
}

/// Control half of a supervised process.
pub trait ProcessControl: Send + Sync + fmt::Debug {
    /// Queue a termination signal. Never blocks.
    fn terminate(&self, signal: TermSignal);

    /// Short human-readable label (program name) for logs.
    fn label(&self) -> &str;
}

/// Handle to a launched process: its control half plus the pending exit.
pub struct ProcessHandle {
    control: Arc<dyn ProcessControl>,
    exit_rx: oneshot::Receiver<std::io::Result<ExitReport>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Assemble a handle. The launcher keeps the sender and fires it exactly
    /// once, after all output has been delivered.
    pub fn new(
        control: Arc<dyn ProcessControl>,
        exit_rx: oneshot::Receiver<std::io::Result<ExitReport>>,
    ) -> Self {
        Self { control, exit_rx }
    }

    pub fn control(&self) -> Arc<dyn ProcessControl> {
        Arc::clone(&self.control)
    }

    pub fn terminate(&self, signal: TermSignal) {
        self.control.terminate(signal);
    }

    /// Wait for the process to exit.
    ///
    /// An error means the exit status could not be collected at all, which is
    /// distinct from a non-zero exit.
    pub async fn wait(self) -> Result<ExitReport> {
        match self.exit_rx.await {
            Ok(report) => Ok(report?),
            Err(_) => Err(TaskError::Other(anyhow::anyhow!(
                "supervisor for '{}' stopped without reporting an exit status",
                self.control.label()
            ))),
        }
    }
}

/// Starts external processes.
///
/// Implementations must not invoke `on_output` synchronously from within
/// `launch`; output is delivered from background tasks.
pub trait ProcessLauncher: Send + Sync + fmt::Debug {
    /// Spawn `spec`. A program that cannot be started yields
    /// [`TaskError::Spawn`], never a handle.
    fn launch(&self, spec: &CommandSpec, on_output: OutputSink) -> Result<ProcessHandle>;
}
