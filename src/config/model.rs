// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// data_dir = "data"
/// worker_program = "python"
/// worker_args = ["run.py"]
/// worker_cwd = "/code"
///
/// [tools]
/// tiler_program = "gdal2tiles.py"
/// zoom_min = 16
/// zoom_max = 21
/// point_cloud_program = "PotreeConverter"
///
/// [test]
/// enabled = false
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub test: TestSection,
}

/// Validated configuration.
///
/// Only obtainable through `RunnerConfig::try_from(raw)` (see `validate.rs`)
/// or `new_unchecked` for callers that build sections in code.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub runner: RunnerSection,
    pub tools: ToolsSection,
    pub test: TestSection,
}

impl RunnerConfig {
    pub(crate) fn new_unchecked(
        runner: RunnerSection,
        tools: ToolsSection,
        test: TestSection,
    ) -> Self {
        Self {
            runner,
            tools,
            test,
        }
    }

    /// Working directory of the task with the given id.
    pub fn task_dir(&self, uuid: &str) -> PathBuf {
        self.runner.data_dir.join(uuid)
    }
}

/// `[runner]` section: where tasks live and how the worker is invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Root directory holding one `<uuid>/` working directory per task.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_worker_program")]
    pub worker_program: String,

    /// Arguments placed before the generated `--option value` pairs.
    #[serde(default = "default_worker_args")]
    pub worker_args: Vec<String>,

    /// Directory the worker is started in (the ODM installation).
    #[serde(default)]
    pub worker_cwd: Option<PathBuf>,

    /// Overrides the CPU count used for the concurrency hint.
    #[serde(default)]
    pub max_cores: Option<usize>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_worker_program() -> String {
    "python".to_string()
}

fn default_worker_args() -> Vec<String> {
    vec!["run.py".to_string()]
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            worker_program: default_worker_program(),
            worker_args: default_worker_args(),
            worker_cwd: None,
            max_cores: None,
        }
    }
}

/// `[tools]` section: the two external conversion programs.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tiler_program")]
    pub tiler_program: String,

    #[serde(default = "default_zoom_min")]
    pub zoom_min: u8,

    #[serde(default = "default_zoom_max")]
    pub zoom_max: u8,

    #[serde(default = "default_point_cloud_program")]
    pub point_cloud_program: String,
}

fn default_tiler_program() -> String {
    "gdal2tiles.py".to_string()
}

fn default_zoom_min() -> u8 {
    16
}

fn default_zoom_max() -> u8 {
    21
}

fn default_point_cloud_program() -> String {
    "PotreeConverter".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tiler_program: default_tiler_program(),
            zoom_min: default_zoom_min(),
            zoom_max: default_zoom_max(),
            point_cloud_program: default_point_cloud_program(),
        }
    }
}

/// `[test]` section.
///
/// In test mode archives are built from a canned results directory and the
/// raw raster outputs resolve there as well.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default)]
    pub skip_orthophotos: bool,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("tests").join("processing_results")
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            enabled: false,
            results_dir: default_results_dir(),
            skip_orthophotos: false,
        }
    }
}
