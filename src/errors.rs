// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    /// The working directory (or one of its required subdirectories) could
    /// not be read while constructing a task.
    #[error("Cannot read task directory {path:?}: {reason}")]
    Construction { path: PathBuf, reason: String },

    /// A caller-supplied option collides with a key computed at start time.
    #[error("Option '{0}' is reserved and cannot be set by the caller")]
    ReservedOption(String),

    #[error("Could not start process ({0})")]
    Spawn(String),

    #[error("Process exited with code {0}")]
    ExitCode(i32),

    #[error("Process terminated by signal {0}")]
    ExitSignal(i32),

    #[error("Task already cancelled")]
    AlreadyCanceled,

    #[error("Task cannot be restarted")]
    CannotRestart,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskError>;
