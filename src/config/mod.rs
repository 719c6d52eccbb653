// src/config/mod.rs

//! Configuration loading and validation for the task runner.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like the zoom range (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{RawConfigFile, RunnerConfig, RunnerSection, TestSection, ToolsSection};
