//! Package discovery: finding directories that contain files matching a marker.
//!
//! A "package" is any directory with at least one direct child file whose name
//! contains a marker fragment (e.g. `_test.go`). Discovery walks the tree once
//! per call and never caches: the filesystem may have changed between runs.

use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A lazy sequence of directories containing at least one marker-matching file.
///
/// Directories are yielded in depth-first traversal order (entries sorted by
/// file name), each at most once, as soon as the first matching file inside
/// them is seen. Hidden directories (base name starting with `.`) are never
/// entered. An unreadable directory surfaces as an `Err` item; the walk is not
/// meaningful past that point and callers are expected to abort.
pub struct MatchedDirs {
    walk: ignore::Walk,
    marker: String,
    yielded: HashSet<PathBuf>,
}

impl Iterator for MatchedDirs {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.walk.by_ref() {
            let entry = match entry.map_err(std::io::Error::other) {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.contains(&self.marker));
            if !matches {
                continue;
            }

            // First matching file wins; later matches in the same directory
            // are skipped via the yielded set.
            if let Some(parent) = entry.path().parent() {
                if self.yielded.insert(parent.to_path_buf()) {
                    return Some(Ok(parent.to_path_buf()));
                }
            }
        }
        None
    }
}

/// Walks the tree under `root`, lazily producing directories that contain a
/// file whose name includes `marker`.
pub fn matched_dirs(root: &Path, marker: &str) -> MatchedDirs {
    MatchedDirs {
        walk: walker(root).build(),
        marker: marker.to_string(),
        yielded: HashSet::new(),
    }
}

/// Discovers all packages under `root` as root-relative display paths.
///
/// The root itself becomes `.`, everything below it `./a/b`. These strings are
/// what targeted runs and the exclusion list match against.
///
/// # Errors
///
/// Returns an error if any directory in the tree cannot be opened or listed.
pub fn locate_packages(root: &Path, marker: &str) -> Result<Vec<String>> {
    matched_dirs(root, marker)
        .map(|dir| dir.map(|d| relative_display(root, &d)))
        .collect()
}

/// Enumerates every non-hidden directory under (and including) `root`.
///
/// Used by the watch controller, which subscribes each directory individually
/// regardless of whether it currently holds any packages.
pub fn subdirectories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in walker(root).build() {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            dirs.push(entry.path().to_path_buf());
        }
    }
    Ok(dirs)
}

fn walker(root: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .sort_by_file_name(|a: &std::ffi::OsStr, b: &std::ffi::OsStr| a.cmp(b))
        .filter_entry(|entry| {
            // The walk root is exempt so that running from a hidden
            // directory still works.
            entry.depth() == 0 || !is_hidden_dir(entry)
        });
    builder
}

fn is_hidden_dir(entry: &ignore::DirEntry) -> bool {
    entry.file_type().is_some_and(|ft| ft.is_dir())
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn relative_display(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => format!("./{}", rel.display()),
        Err(_) => dir.display().to_string(),
    }
}
