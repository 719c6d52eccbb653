// src/exec/process.rs

//! Production launcher built on `tokio::process`.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskError};

use super::ansi::unfinished_sequence_start;
use super::supervisor::{
    CommandSpec, ExitReport, OutputSink, ProcessControl, ProcessHandle, ProcessLauncher,
    TermSignal,
};

/// How long to keep draining output pipes after the process itself exited.
/// Grandchildren that inherited the pipes could otherwise hold them open
/// indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_BUF_SIZE: usize = 8192;

/// Launcher that spawns real OS processes.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, spec: &CommandSpec, on_output: OutputSink) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TaskError::Spawn(format!("{}: {e}", spec.program)))?;

        let pid = child.id();
        info!(program = %spec.program, pid = ?pid, "spawned process");

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_output(stdout, Arc::clone(&on_output))));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_output(stderr, Arc::clone(&on_output))));
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<TermSignal>();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            pid,
            spec.program.clone(),
            signal_rx,
            pumps,
            exit_tx,
        ));

        let control = TokioProcessControl {
            label: spec.program.clone(),
            signal_tx,
        };
        Ok(ProcessHandle::new(Arc::new(control), exit_rx))
    }
}

#[derive(Debug)]
struct TokioProcessControl {
    label: String,
    signal_tx: mpsc::UnboundedSender<TermSignal>,
}

impl ProcessControl for TokioProcessControl {
    fn terminate(&self, signal: TermSignal) {
        if self.signal_tx.send(signal).is_err() {
            debug!(program = %self.label, ?signal, "process already exited; ignoring terminate");
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Owns the child until it exits, delivering signals as they arrive.
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    label: String,
    mut signal_rx: mpsc::UnboundedReceiver<TermSignal>,
    pumps: Vec<JoinHandle<()>>,
    exit_tx: oneshot::Sender<std::io::Result<ExitReport>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = signal_rx.recv() => deliver_signal(&mut child, pid, signal, &label),
        }
    };

    // Report the exit only after every chunk reached the sink.
    for mut pump in pumps {
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut pump).await.is_err() {
            debug!(program = %label, "output pipe still open after exit; abandoning it");
            pump.abort();
        }
    }

    let report = status.map(exit_report);
    if let Ok(r) = &report {
        info!(program = %label, exit_code = ?r.code, signal = ?r.signal, "process exited");
    }
    let _ = exit_tx.send(report);
}

fn deliver_signal(child: &mut Child, pid: Option<u32>, signal: TermSignal, label: &str) {
    info!(program = %label, ?signal, "terminating process");
    match (signal, pid) {
        #[cfg(unix)]
        (TermSignal::Interrupt, Some(pid)) => {
            // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
            if rc != 0 {
                warn!(
                    program = %label,
                    error = %std::io::Error::last_os_error(),
                    "failed to send SIGINT"
                );
            }
        }
        _ => {
            if let Err(e) = child.start_kill() {
                warn!(program = %label, error = %e, "failed to kill process");
            }
        }
    }
}

fn exit_report(status: ExitStatus) -> ExitReport {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitReport {
        code: status.code(),
        signal,
    }
}

/// Forward raw chunks from a pipe to the sink.
///
/// A multi-byte UTF-8 sequence or a colour sequence split across reads is
/// carried over to the next chunk, so the sink always sees them whole.
async fn pump_output<R>(mut reader: R, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "error reading process output");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        let mut keep_from = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        if let Some(start) = unfinished_sequence_start(&pending[..keep_from]) {
            keep_from = start;
        }
        if keep_from == 0 {
            continue;
        }

        let rest = pending.split_off(keep_from);
        let chunk = String::from_utf8_lossy(&pending).into_owned();
        pending = rest;
        sink(chunk);
    }

    if !pending.is_empty() {
        sink(String::from_utf8_lossy(&pending).into_owned());
    }
}
