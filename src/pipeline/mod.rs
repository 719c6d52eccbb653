// src/pipeline/mod.rs

//! Post-processing after the worker exits successfully.
//!
//! - [`stage`] defines a named asynchronous stage and the sequential,
//!   fail-fast runner that drives a list of them.
//! - [`archive`] packages result files into zip archives.
//! - [`postprocess`] assembles the fixed ODM stage list: tiles, point
//!   cloud, then the archive bundles.

pub mod archive;
pub mod postprocess;
pub mod stage;

pub use archive::{ArchiveBuilder, ArchiveSummary};
pub use postprocess::{ARCHIVES, ArchiveSpec, PostProcessContext, post_process_stages};
pub use stage::{PipelineOutcome, ProcessTracker, Stage, run_stages, run_supervised};
