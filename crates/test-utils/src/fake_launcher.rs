use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use odm_task::errors::{Result, TaskError};
use odm_task::exec::{
    CommandSpec, ExitReport, OutputSink, ProcessControl, ProcessHandle, ProcessLauncher,
    TermSignal,
};

/// SIGINT, reported as the exit signal of an interrupted fake process.
pub const SIGINT: i32 = 2;
/// SIGKILL.
pub const SIGKILL: i32 = 9;

/// What a fake process does once launched.
#[derive(Debug, Clone)]
pub struct FakeScript {
    /// Emitted right after launch, in order.
    pub chunks: Vec<String>,
    /// Time until the process exits on its own.
    pub delay: Duration,
    pub exit: ExitReport,
    /// Fail `launch` with a spawn error instead of starting.
    pub fail_spawn: bool,
    /// Never exit unless terminated.
    pub hang: bool,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            delay: Duration::ZERO,
            exit: ExitReport::exited(0),
            fail_spawn: false,
            hang: false,
        }
    }
}

impl FakeScript {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn exit_code(code: i32) -> Self {
        Self {
            exit: ExitReport::exited(code),
            ..Self::default()
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, chunk: &str) -> Self {
        self.chunks.push(chunk.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A fake launcher that:
/// - records every command it was asked to launch
/// - plays back a scripted behaviour per program name (success by default)
/// - honours terminate requests by exiting with the matching signal.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    scripts: Arc<Mutex<HashMap<String, FakeScript>>>,
    launched: Arc<Mutex<Vec<CommandSpec>>>,
    terminations: Arc<Mutex<Vec<(String, TermSignal)>>>,
}

impl fmt::Debug for FakeLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeLauncher")
            .field("launched", &self.launched.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of `program`.
    pub fn script(self, program: &str, script: FakeScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), script);
        self
    }

    /// Every launched command, in launch order.
    pub fn launched(&self) -> Vec<CommandSpec> {
        self.launched.lock().unwrap().clone()
    }

    pub fn launched_programs(&self) -> Vec<String> {
        self.launched().into_iter().map(|s| s.program).collect()
    }

    /// `(program, signal)` for every terminate call received.
    pub fn terminations(&self) -> Vec<(String, TermSignal)> {
        self.terminations.lock().unwrap().clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &CommandSpec, on_output: OutputSink) -> Result<ProcessHandle> {
        self.launched.lock().unwrap().push(spec.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&spec.program)
            .cloned()
            .unwrap_or_default();

        if script.fail_spawn {
            return Err(TaskError::Spawn(format!(
                "{}: No such file or directory",
                spec.program
            )));
        }

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<TermSignal>();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            for chunk in script.chunks {
                on_output(chunk);
            }

            let report = if script.hang {
                match signal_rx.recv().await {
                    Some(signal) => signal_report(signal),
                    None => ExitReport::signaled(SIGKILL),
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(script.delay) => script.exit,
                    Some(signal) = signal_rx.recv() => signal_report(signal),
                }
            };
            let _ = exit_tx.send(Ok(report));
        });

        let control = FakeControl {
            label: spec.program.clone(),
            signal_tx,
            terminations: Arc::clone(&self.terminations),
        };
        Ok(ProcessHandle::new(Arc::new(control), exit_rx))
    }
}

fn signal_report(signal: TermSignal) -> ExitReport {
    match signal {
        TermSignal::Interrupt => ExitReport::signaled(SIGINT),
        TermSignal::Kill => ExitReport::signaled(SIGKILL),
    }
}

#[derive(Debug)]
struct FakeControl {
    label: String,
    signal_tx: mpsc::UnboundedSender<TermSignal>,
    terminations: Arc<Mutex<Vec<(String, TermSignal)>>>,
}

impl ProcessControl for FakeControl {
    fn terminate(&self, signal: TermSignal) {
        self.terminations
            .lock()
            .unwrap()
            .push((self.label.clone(), signal));
        let _ = self.signal_tx.send(signal);
    }

    fn label(&self) -> &str {
        &self.label
    }
}
