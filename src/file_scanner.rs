use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::IngestError;

/// Case-insensitive extension allow-list, stored without leading dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| allowed == &ext.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Depth-first walk over a directory tree yielding matching files lazily.
///
/// Entries are visited in file name order and symlinks are followed; a link
/// back to an ancestor is reported by the walker and skipped. Anything that
/// cannot be read (a directory that is unlistable or vanished mid-scan) is
/// logged and skipped.
pub struct FileScanner {
    filter: ExtensionFilter,
    walker: walkdir::IntoIter,
    unreadable_entries: usize,
    symlink_loops: usize,
}

impl FileScanner {
    /// Fails before scanning when the root is missing or not a directory.
    pub fn new(root: &Path, filter: ExtensionFilter) -> Result<Self, IngestError> {
        let root = fs::canonicalize(root).map_err(|_| IngestError::RootNotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(IngestError::NotADirectory(root));
        }

        info!("Scanning directory: {}", root.display());

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        Ok(Self {
            filter,
            walker,
            unreadable_entries: 0,
            symlink_loops: 0,
        })
    }

    /// Entries skipped so far because they could not be read.
    pub fn unreadable_entries(&self) -> usize {
        self.unreadable_entries
    }

    pub fn symlink_loops(&self) -> usize {
        self.symlink_loops
    }

    fn skip_error(&mut self, error: walkdir::Error) {
        let path = error
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        if let Some(ancestor) = error.loop_ancestor() {
            debug!(
                "Skipping symlink loop {} -> {}",
                path,
                ancestor.display()
            );
            self.symlink_loops += 1;
        } else {
            warn!("Skipping unreadable entry {}: {}", path, error);
            self.unreadable_entries += 1;
        }
    }
}

impl Iterator for FileScanner {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.filter.matches(entry.path()) {
                        return Some(entry.into_path());
                    }
                }
                Err(e) => self.skip_error(e),
            }
        }
    }
}
