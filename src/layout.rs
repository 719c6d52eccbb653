// src/layout.rs

//! Fixed names inside a task's working directory.
//!
//! The worker writes its results under well-known subdirectories; the
//! post-processing stages and asset resolution read from the same places.

/// Input images uploaded for the task.
pub const IMAGES_DIR: &str = "images";
/// Ground control point files (`*.txt`).
pub const GCP_DIR: &str = "gcp";

pub const ORTHOPHOTO_DIR: &str = "odm_orthophoto";
pub const ORTHOPHOTO_TIF: &str = "odm_orthophoto/odm_orthophoto.tif";

pub const GEOREFERENCING_DIR: &str = "odm_georeferencing";
pub const GEOREFERENCED_PLY: &str = "odm_georeferencing/odm_georeferenced_model.ply";
pub const GEOREFERENCED_LAS: &str = "odm_georeferencing/odm_georeferenced_model.las";
pub const GEOREFERENCED_CSV: &str = "odm_georeferencing/odm_georeferenced_model.csv";

pub const TEXTURING_DIR: &str = "odm_texturing";
pub const TEXTURE_IMAGES: &str = "odm_texturing/*.jpg";
pub const TEXTURED_MODEL_OBJ: &str = "odm_texturing/odm_textured_model_geo.obj";
pub const TEXTURED_MODEL_MTL: &str = "odm_texturing/odm_textured_model_geo.mtl";

pub const MESHING_DIR: &str = "odm_meshing";

/// Generated by the tiling stage.
pub const TILES_DIR: &str = "orthophoto_tiles";
/// Generated by the point-cloud conversion stage.
pub const POTREE_DIR: &str = "potree_pointcloud";
