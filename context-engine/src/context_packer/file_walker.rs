//! File Walker: project file discovery using the `ignore` crate
//!
//! Excluded directories are pruned before descent. Siblings are visited in
//! file-name order so discovery order is reproducible between runs.

use crate::harness::error::{HarnessError, HarnessResult};
use crate::harness::settings::DEFAULT_IGNORE_DIRS;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A file found below the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Slash-separated path relative to the root
    pub relative_path: String,
    /// Path usable for reading
    pub path: PathBuf,
}

/// Walks a project tree for files, skipping excluded directories.
pub struct FileWalker {
    root: PathBuf,
    ignore_dirs: HashSet<String>,
    respect_gitignore: bool,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
            respect_gitignore: false,
        }
    }

    /// Replace the excluded directory names
    pub fn with_ignore_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Also honor `.gitignore` files
    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return every file under root in discovery order.
    ///
    /// Fails only when the root itself cannot be listed; unreadable
    /// subdirectories are skipped.
    pub fn files(&self) -> HarnessResult<Vec<DiscoveredFile>> {
        std::fs::read_dir(&self.root).map_err(|e| HarnessError::traversal(&self.root, e))?;

        let ignore_dirs = self.ignore_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .git_ignore(self.respect_gitignore)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignore_dirs.contains(name)))
            })
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable walk entry");
                    continue;
                }
            };
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.path();
            // Symlinked directories are listed but never descended into or read
            if path.is_dir() {
                continue;
            }
            let Some(relative_path) = relative_posix(&self.root, path) else {
                continue;
            };
            files.push(DiscoveredFile {
                relative_path,
                path: path.to_path_buf(),
            });
        }

        Ok(files)
    }
}

fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
