// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `odm-task`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "odm-task",
    version,
    about = "Run one ODM processing task and its post-processing pipeline.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "OdmTask.toml")]
    pub config: String,

    /// Task identifier; the working directory is `<data_dir>/<uuid>`.
    ///
    /// A fresh v4 UUID is generated when omitted.
    #[arg(long, value_name = "UUID")]
    pub uuid: Option<String>,

    /// Display name of the task.
    #[arg(long, value_name = "NAME", default_value = "")]
    pub name: String,

    /// Worker option as `name=value`; may be repeated.
    ///
    /// The value is parsed as JSON when possible (`true`, `42`), otherwise it
    /// is passed as a string.
    #[arg(long = "option", value_name = "NAME=VALUE")]
    pub options: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ODM_TASK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Discover the task and print the worker command line without running it.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
