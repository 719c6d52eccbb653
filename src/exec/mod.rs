// src/exec/mod.rs

//! Process supervision layer.
//!
//! This module is responsible for actually running the external programs a
//! task needs (the ODM worker, the tiler and the point-cloud converter),
//! streaming their output back and delivering termination requests.
//!
//! - [`supervisor`] defines the launcher/handle abstraction the task talks
//!   to. Tests plug in a fake launcher through the same trait.
//! - [`process`] is the production launcher built on `tokio::process`.
//! - [`commands`] turns configuration and options into command lines.
//! - [`ansi`] strips terminal colour sequences from captured output.

pub mod ansi;
pub mod commands;
pub mod process;
pub mod supervisor;

pub use process::TokioLauncher;
pub use supervisor::{
    CommandSpec, ExitReport, OutputSink, ProcessControl, ProcessHandle, ProcessLauncher,
    TermSignal,
};
