// src/task/discovery.rs

//! Scan of a task's working directory at construction time.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{Result, TaskError};
use crate::fs::FileSystem;
use crate::layout;

/// Inputs found in a working directory. Sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub images: Vec<PathBuf>,
    pub ground_control_files: Vec<PathBuf>,
}

/// List the images and ground control files below `project_dir`.
///
/// The working directory and its `images/` subdirectory must exist. A
/// missing `gcp/` directory just means there are no ground control files.
pub fn discover(fs: &dyn FileSystem, project_dir: &Path) -> Result<Discovery> {
    if !fs.is_dir(project_dir) {
        return Err(TaskError::Construction {
            path: project_dir.to_path_buf(),
            reason: "working directory does not exist".to_string(),
        });
    }

    let images_dir = project_dir.join(layout::IMAGES_DIR);
    let images = list_files(fs, &images_dir).map_err(|e| TaskError::Construction {
        path: images_dir.clone(),
        reason: format!("{e:#}"),
    })?;

    let gcp_dir = project_dir.join(layout::GCP_DIR);
    let ground_control_files = if fs.is_dir(&gcp_dir) {
        list_files(fs, &gcp_dir)
            .map_err(|e| TaskError::Construction {
                path: gcp_dir.clone(),
                reason: format!("{e:#}"),
            })?
            .into_iter()
            .filter(|p| is_gcp_file(p))
            .collect()
    } else {
        debug!(dir = ?gcp_dir, "no ground control directory");
        Vec::new()
    };

    debug!(
        dir = ?project_dir,
        images = images.len(),
        gcp_files = ground_control_files.len(),
        "scanned working directory"
    );

    Ok(Discovery {
        images,
        ground_control_files,
    })
}

fn list_files(fs: &dyn FileSystem, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|p| fs.is_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// `.txt`, any case.
fn is_gcp_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}
