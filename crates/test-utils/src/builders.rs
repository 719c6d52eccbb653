#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use odm_task::config::{RawConfigFile, RunnerConfig};
use odm_task::exec::ProcessLauncher;
use odm_task::layout;
use odm_task::task::TaskContext;
use tempfile::TempDir;

/// Builder for `RunnerConfig` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new(data_dir: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.runner.data_dir = data_dir.to_path_buf();
        Self { config }
    }

    pub fn max_cores(mut self, cores: usize) -> Self {
        self.config.runner.max_cores = Some(cores);
        self
    }

    pub fn worker(mut self, program: &str, args: &[&str]) -> Self {
        self.config.runner.worker_program = program.to_string();
        self.config.runner.worker_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn tools(mut self, tiler: &str, point_cloud: &str) -> Self {
        self.config.tools.tiler_program = tiler.to_string();
        self.config.tools.point_cloud_program = point_cloud.to_string();
        self
    }

    pub fn test_mode(mut self, results_dir: &Path, skip_orthophotos: bool) -> Self {
        self.config.test.enabled = true;
        self.config.test.results_dir = results_dir.to_path_buf();
        self.config.test.skip_orthophotos = skip_orthophotos;
        self
    }

    pub fn build(self) -> RunnerConfig {
        RunnerConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for a temporary data directory holding one task.
pub struct TaskDirBuilder {
    uuid: String,
    images: usize,
    gcp_files: Vec<String>,
    odm_outputs: bool,
}

impl TaskDirBuilder {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            images: 0,
            gcp_files: Vec::new(),
            odm_outputs: false,
        }
    }

    pub fn images(mut self, count: usize) -> Self {
        self.images = count;
        self
    }

    pub fn gcp_file(mut self, name: &str) -> Self {
        self.gcp_files.push(name.to_string());
        self
    }

    /// Pre-populate the results the worker would have written.
    pub fn with_odm_outputs(mut self) -> Self {
        self.odm_outputs = true;
        self
    }

    pub fn build(self) -> TaskDir {
        let data_dir = tempfile::tempdir().expect("create temp data dir");
        let project_dir = data_dir.path().join(&self.uuid);

        let images_dir = project_dir.join(layout::IMAGES_DIR);
        fs::create_dir_all(&images_dir).expect("create images dir");
        for i in 0..self.images {
            fs::write(images_dir.join(format!("DJI_{i:04}.JPG")), b"jpeg").expect("write image");
        }

        if !self.gcp_files.is_empty() {
            let gcp_dir = project_dir.join(layout::GCP_DIR);
            fs::create_dir_all(&gcp_dir).expect("create gcp dir");
            for name in &self.gcp_files {
                fs::write(gcp_dir.join(name), b"WGS84 UTM 32N\n").expect("write gcp file");
            }
        }

        if self.odm_outputs {
            write_odm_outputs(&project_dir);
        }

        TaskDir {
            data_dir,
            uuid: self.uuid,
        }
    }
}

/// Fake worker results under `root`, laid out like a real run.
pub fn write_odm_outputs(root: &Path) {
    let files = [
        layout::ORTHOPHOTO_TIF,
        "odm_orthophoto/odm_orthophoto.png",
        layout::GEOREFERENCED_PLY,
        layout::GEOREFERENCED_LAS,
        layout::GEOREFERENCED_CSV,
        layout::TEXTURED_MODEL_OBJ,
        layout::TEXTURED_MODEL_MTL,
        "odm_texturing/odm_textured_model_geo_material0000_map_Kd.jpg",
        "odm_texturing/odm_textured_model_geo_material0001_map_Kd.jpg",
        "odm_meshing/odm_mesh.ply",
    ];
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create output dir");
        }
        fs::write(&path, rel.as_bytes()).expect("write output file");
    }
}

/// A data directory containing one task's working directory. Deleted on drop.
pub struct TaskDir {
    data_dir: TempDir,
    uuid: String,
}

impl TaskDir {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.data_dir.path().join(&self.uuid)
    }

    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(self.data_dir.path()).max_cores(4)
    }

    /// Real filesystem, the given launcher, default config with 4 cores.
    pub fn context(&self, launcher: Arc<dyn ProcessLauncher>) -> Arc<TaskContext> {
        Arc::new(TaskContext::new(self.config().build()).with_launcher(launcher))
    }
}
