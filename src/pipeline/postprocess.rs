// src/pipeline/postprocess.rs

//! The fixed post-processing plan run after a successful worker exit.
//!
//! Order: raster tiles, streamable point cloud, then one archive per entry of
//! [`ARCHIVES`]. Tools read from and write to the task's working directory;
//! archives read from `source_root` (the working directory, or the canned
//! results directory in test mode) and are written into the working
//! directory.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ToolsSection;
use crate::exec::{OutputSink, ProcessLauncher, commands};
use crate::layout;

use super::archive::ArchiveBuilder;
use super::stage::{ProcessTracker, Stage, run_supervised};

/// One archive produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpec {
    /// File name, also the public asset name.
    pub name: &'static str,
    /// Paths relative to the source root; see [`ArchiveBuilder`].
    pub entries: &'static [&'static str],
}

/// Archives in build order.
pub const ARCHIVES: &[ArchiveSpec] = &[
    ArchiveSpec {
        name: "all.zip",
        entries: &[
            layout::ORTHOPHOTO_DIR,
            layout::GEOREFERENCING_DIR,
            layout::TEXTURING_DIR,
            layout::MESHING_DIR,
            layout::TILES_DIR,
            layout::POTREE_DIR,
        ],
    },
    ArchiveSpec {
        name: "georeferenced_model.ply.zip",
        entries: &[layout::GEOREFERENCED_PLY],
    },
    ArchiveSpec {
        name: "georeferenced_model.las.zip",
        entries: &[layout::GEOREFERENCED_LAS],
    },
    ArchiveSpec {
        name: "georeferenced_model.csv.zip",
        entries: &[layout::GEOREFERENCED_CSV],
    },
    ArchiveSpec {
        name: "textured_model.zip",
        entries: &[
            layout::TEXTURE_IMAGES,
            layout::TEXTURED_MODEL_OBJ,
            layout::TEXTURED_MODEL_MTL,
        ],
    },
    ArchiveSpec {
        name: "tiles.zip",
        entries: &[layout::TILES_DIR],
    },
];

/// Everything the stages need, owned so each stage closure can hold a clone.
#[derive(Clone)]
pub struct PostProcessContext {
    /// The task's working directory.
    pub project_dir: PathBuf,
    /// Where archive entries are read from.
    pub source_root: PathBuf,
    pub tools: ToolsSection,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub output: OutputSink,
    pub tracker: Arc<dyn ProcessTracker>,
}

/// Build the stage list for one run.
pub fn post_process_stages(ctx: PostProcessContext) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(2 + ARCHIVES.len());

    let tiles = ctx.clone();
    stages.push(Stage::new("tiles", move || async move {
        let spec = commands::tiler_command(
            &tiles.tools,
            &tiles.project_dir.join(layout::ORTHOPHOTO_TIF),
            &tiles.project_dir.join(layout::TILES_DIR),
        );
        run_supervised(
            tiles.launcher.as_ref(),
            &spec,
            tiles.output,
            tiles.tracker.as_ref(),
        )
        .await
    }));

    let cloud = ctx.clone();
    stages.push(Stage::new("point_cloud", move || async move {
        let spec = commands::point_cloud_command(
            &cloud.tools,
            &cloud.project_dir.join(layout::GEOREFERENCED_LAS),
            &cloud.project_dir.join(layout::POTREE_DIR),
        );
        run_supervised(
            cloud.launcher.as_ref(),
            &spec,
            cloud.output,
            cloud.tracker.as_ref(),
        )
        .await
    }));

    for archive in ARCHIVES {
        let builder = ArchiveBuilder::new(ctx.source_root.clone());
        let output_path = ctx.project_dir.join(archive.name);
        let output = Arc::clone(&ctx.output);
        stages.push(Stage::new(archive.name, move || async move {
            output(format!("Compressing {}\n", archive.name));
            builder.build(&output_path, archive.entries).await?;
            Ok(())
        }));
    }

    stages
}
