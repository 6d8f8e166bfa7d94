use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::SeekerError;
use crate::search::pattern::{normalize_path, Pattern};
use crate::search::{EvidenceSource, SourceKind};

/// Evidence source over an already extracted filesystem tree.
///
/// Every file and directory below the root is indexed once, depth-first.
/// Matches are returned as the real paths; nothing is copied.
pub struct DirectorySource {
    root: PathBuf,
    /// (root-relative normalized path, real path)
    entries: Vec<(String, PathBuf)>,
}

impl DirectorySource {
    /// Index the directory tree rooted at `root`
    pub fn open(root: &Path) -> Result<Self, SeekerError> {
        if !root.is_dir() {
            return Err(SeekerError::container(root, "not a directory"));
        }

        info!("Building files listing for {}...", root.display());
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Unreadable subtrees do not make the whole container unusable
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let relative = entry
                .path()
                .strip_prefix(root)
                .map(normalize_path)
                .unwrap_or_else(|_| normalize_path(entry.path()));
            entries.push((relative, entry.into_path()));
        }
        info!("File listing complete - {} files", entries.len());

        Ok(DirectorySource {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Root of the indexed tree
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EvidenceSource for DirectorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Fs
    }

    fn search(&mut self, pattern: &Pattern) -> Result<Vec<PathBuf>, SeekerError> {
        Ok(self
            .entries
            .iter()
            .filter(|(relative, _)| pattern.is_match(relative))
            .map(|(_, path)| path.clone())
            .collect())
    }

    fn indexed(&self) -> usize {
        self.entries.len()
    }

    fn extraction_failures(&self) -> usize {
        0
    }

    fn cleanup(&mut self) -> Result<(), SeekerError> {
        Ok(())
    }
}
