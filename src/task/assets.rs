// src/task/assets.rs

//! Public asset names and where they live on disk.

use std::path::{Path, PathBuf};

use crate::config::TestSection;
use crate::layout;
use crate::pipeline::ARCHIVES;

/// Raw raster outputs exposed next to the archives.
pub const RASTER_ASSETS: &[&str] = &["orthophoto.tif", "orthophoto.png"];

/// Directory archive entries are read from.
///
/// In test mode this is the canned results directory instead of the task's
/// own working directory.
pub fn archive_source_root(test: &TestSection, project_dir: &Path) -> PathBuf {
    if test.enabled {
        test.results_dir.clone()
    } else {
        project_dir.to_path_buf()
    }
}

/// Resolve a public asset name.
///
/// Archives always live in the working directory. The raw rasters are read
/// from `odm_orthophoto/odm_<name>`, under the results directory in test
/// mode; with `skip_orthophotos` they are not available at all. Any other
/// name yields `None`.
pub fn resolve_asset(test: &TestSection, project_dir: &Path, name: &str) -> Option<PathBuf> {
    if ARCHIVES.iter().any(|a| a.name == name) {
        return Some(project_dir.join(name));
    }

    if !RASTER_ASSETS.contains(&name) {
        return None;
    }

    let raster = Path::new(layout::ORTHOPHOTO_DIR).join(format!("odm_{name}"));
    match (test.enabled, test.skip_orthophotos) {
        (false, _) => Some(project_dir.join(raster)),
        (true, true) => None,
        (true, false) => Some(test.results_dir.join(raster)),
    }
}
