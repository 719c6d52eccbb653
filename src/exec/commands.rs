// src/exec/commands.rs

//! Command lines for the worker and the two conversion tools.

use std::path::Path;

use crate::config::{RunnerSection, ToolsSection};

use super::supervisor::CommandSpec;

/// The ODM worker: `<program> <worker_args...> <option args...> <project>`.
pub fn worker_command<I>(runner: &RunnerSection, option_args: I, project_name: &str) -> CommandSpec
where
    I: IntoIterator<Item = String>,
{
    CommandSpec::new(runner.worker_program.clone())
        .args(runner.worker_args.iter().cloned())
        .args(option_args)
        .arg(project_name)
        .current_dir(runner.worker_cwd.clone())
}

/// Raster tiles from the orthophoto, e.g.
/// `gdal2tiles.py -z 16-21 -n -w none <input> <output_dir>`.
pub fn tiler_command(tools: &ToolsSection, input: &Path, output_dir: &Path) -> CommandSpec {
    CommandSpec::new(tools.tiler_program.clone())
        .arg("-z")
        .arg(format!("{}-{}", tools.zoom_min, tools.zoom_max))
        .args(["-n", "-w", "none"])
        .arg(input.to_string_lossy())
        .arg(output_dir.to_string_lossy())
}

/// Streamable point cloud from the georeferenced LAS output, e.g.
/// `PotreeConverter <input> -o <output_dir>`.
pub fn point_cloud_command(tools: &ToolsSection, input: &Path, output_dir: &Path) -> CommandSpec {
    CommandSpec::new(tools.point_cloud_program.clone())
        .arg(input.to_string_lossy())
        .arg("-o")
        .arg(output_dir.to_string_lossy())
}
