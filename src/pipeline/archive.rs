// src/pipeline/archive.rs

//! Zip packaging of task results.
//!
//! Entries are paths relative to a source root and come in three kinds:
//!
//! - a directory, added recursively under its own relative path;
//! - a glob pattern (contains `*`), expanded at build time to the regular
//!   files it matches, each added flat under its basename;
//! - a literal file, added under its basename.
//!
//! Directories and files are queued in the order given. Glob patterns are
//! then expanded concurrently and the archive is only finalized once every
//! pattern's matches are in. Entries that do not exist are skipped.
//!
//! Any I/O error aborts the build. A partially written output file is left
//! in place.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tokio::task::JoinSet;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{Result, TaskError};

/// Something queued for inclusion in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArchiveItem {
    /// Directory on disk, stored under `name/`.
    Directory { path: PathBuf, name: String },
    /// Regular file on disk, stored as `name`.
    File { path: PathBuf, name: String },
}

/// Result of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of regular files written.
    pub files: usize,
}

/// Builds zip archives from paths under a fixed source root.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    source_root: PathBuf,
}

impl ArchiveBuilder {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
        }
    }

    /// Write `output_path` containing `entries` (relative to the source root).
    pub async fn build<S: AsRef<str>>(
        &self,
        output_path: &Path,
        entries: &[S],
    ) -> Result<ArchiveSummary> {
        let mut items = Vec::new();
        let mut patterns = Vec::new();

        for entry in entries {
            let entry = entry.as_ref();
            if is_glob(entry) {
                patterns.push(entry.to_string());
                continue;
            }

            let path = self.source_root.join(entry);
            if !path.exists() {
                debug!(entry, archive = ?output_path, "skipping missing archive entry");
                continue;
            }

            if path.is_dir() {
                items.push(ArchiveItem::Directory {
                    path,
                    name: to_archive_name(Path::new(entry)),
                });
            } else {
                items.push(ArchiveItem::File {
                    name: basename(&path),
                    path,
                });
            }
        }

        items.extend(self.expand_globs(patterns).await?);

        let output = output_path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || write_archive(&output, &items))
            .await
            .map_err(|e| TaskError::Other(anyhow::anyhow!("archive writer panicked: {e}")))??;

        info!(archive = ?output_path, files, "archive written");
        Ok(ArchiveSummary { files })
    }

    /// Expand all patterns concurrently; results keep pattern order.
    async fn expand_globs(&self, patterns: Vec<String>) -> Result<Vec<ArchiveItem>> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let mut set = JoinSet::new();
        for (index, pattern) in patterns.into_iter().enumerate() {
            let root = self.source_root.clone();
            set.spawn_blocking(move || (index, expand_glob(&root, &pattern)));
        }

        let mut expanded: Vec<(usize, Vec<PathBuf>)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, matches) = joined
                .map_err(|e| TaskError::Other(anyhow::anyhow!("glob expansion panicked: {e}")))?;
            // Returning here drops the set, which aborts the remaining expansions.
            expanded.push((index, matches?));
        }
        expanded.sort_by_key(|(index, _)| *index);

        Ok(expanded
            .into_iter()
            .flat_map(|(_, paths)| paths)
            .map(|path| ArchiveItem::File {
                name: basename(&path),
                path,
            })
            .collect())
    }
}

fn is_glob(entry: &str) -> bool {
    entry.contains('*')
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Forward-slash archive name for a relative path.
fn to_archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Regular files under `root` whose root-relative path matches `pattern`.
///
/// The walk starts at the longest literal prefix of the pattern and only
/// descends further than the pattern's depth when it contains `**`.
fn expand_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let normalized = pattern.replace('\\', "/");
    let matcher = compile_glob(&normalized)?;

    let components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();
    let literal_len = components
        .iter()
        .take_while(|c| !c.contains(['*', '?', '[', '{']))
        .count();
    let base = components[..literal_len]
        .iter()
        .fold(root.to_path_buf(), |acc, c| acc.join(c));

    if !base.is_dir() {
        debug!(pattern, "glob base directory missing; no matches");
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&base).min_depth(1);
    if !normalized.contains("**") {
        walker = walker.max_depth(components.len() - literal_len);
    }

    let mut matches = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| TaskError::IoError(e.into()))?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !matcher.is_match(to_archive_name(rel)) {
            continue;
        }
        if entry.file_type().is_file() {
            matches.push(entry.into_path());
        } else {
            debug!(path = ?entry.path(), "glob match is not a regular file; skipping");
        }
    }

    matches.sort();
    Ok(matches)
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| TaskError::Other(anyhow::anyhow!("invalid glob pattern {pattern}: {e}")))?;
    Ok(glob.compile_matcher())
}

/// Blocking writer. Returns the number of regular files stored.
fn write_archive(output: &Path, items: &[ArchiveItem]) -> Result<usize> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut written: HashSet<String> = HashSet::new();
    let mut files = 0usize;

    for item in items {
        match item {
            ArchiveItem::File { path, name } => {
                if add_file(&mut zip, &mut written, path, name)? {
                    files += 1;
                }
            }
            ArchiveItem::Directory { path, name } => {
                add_directory_entry(&mut zip, &mut written, name)?;
                for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
                    let entry = entry.map_err(|e| TaskError::IoError(e.into()))?;
                    let Ok(rel) = entry.path().strip_prefix(path) else {
                        continue;
                    };
                    let entry_name = format!("{name}/{}", to_archive_name(rel));
                    if entry.file_type().is_dir() {
                        add_directory_entry(&mut zip, &mut written, &entry_name)?;
                    } else if entry.file_type().is_file()
                        && add_file(&mut zip, &mut written, entry.path(), &entry_name)?
                    {
                        files += 1;
                    }
                }
            }
        }
    }

    let mut inner = zip.finish()?;
    inner.flush()?;
    Ok(files)
}

fn file_options(len: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(len >= u64::from(u32::MAX))
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    written: &mut HashSet<String>,
    path: &Path,
    name: &str,
) -> Result<bool> {
    if !written.insert(name.to_string()) {
        debug!(name, path = ?path, "duplicate archive name; keeping the first entry");
        return Ok(false);
    }

    let mut source = File::open(path)?;
    let len = source.metadata()?.len();
    zip.start_file(name, file_options(len))?;
    std::io::copy(&mut source, zip)?;
    Ok(true)
}

fn add_directory_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    written: &mut HashSet<String>,
    name: &str,
) -> Result<()> {
    let dir_name = format!("{name}/");
    if written.insert(dir_name.clone()) {
        zip.add_directory(dir_name, SimpleFileOptions::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn glob_detection_only_looks_for_stars() {
        assert!(is_glob("odm_texturing/*.jpg"));
        assert!(!is_glob("odm_texturing/odm_textured_model_geo.obj"));
    }

    #[test]
    fn expand_glob_is_not_recursive_without_double_star() {
        let dir = tempfile::tempdir().unwrap();
        let tex = dir.path().join("odm_texturing");
        fs::create_dir_all(tex.join("nested")).unwrap();
        fs::write(tex.join("a.jpg"), b"a").unwrap();
        fs::write(tex.join("b.jpg"), b"b").unwrap();
        fs::write(tex.join("c.png"), b"c").unwrap();
        fs::write(tex.join("nested").join("d.jpg"), b"d").unwrap();

        let matches = expand_glob(dir.path(), "odm_texturing/*.jpg").unwrap();
        let names: Vec<String> = matches.iter().map(|p| basename(p)).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn expand_glob_with_missing_base_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(expand_glob(dir.path(), "nope/*.jpg").unwrap().is_empty());
    }

    #[test]
    fn archive_names_use_forward_slashes() {
        let rel = Path::new("odm_georeferencing").join("model.ply");
        assert_eq!(to_archive_name(&rel), "odm_georeferencing/model.ply");
    }
}
