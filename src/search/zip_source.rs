use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use zip::ZipArchive;

use crate::error::SeekerError;
use crate::search::pattern::{normalize_member_name, Pattern};
use crate::search::{EvidenceSource, SourceKind};

#[derive(Debug, Clone)]
struct ZipMember {
    index: usize,
    name: String,
    is_dir: bool,
}

/// Evidence source over a zip archive.
///
/// The entry list is read once on open. A corrupt or unwritable entry is
/// logged and skipped so the remaining matches are still extracted.
pub struct ZipSource {
    path: PathBuf,
    scratch: PathBuf,
    archive: Option<ZipArchive<File>>,
    members: Vec<ZipMember>,
    extracted: HashMap<usize, PathBuf>,
    failed: HashSet<usize>,
}

impl ZipSource {
    /// Open a zip archive and read its entry list
    pub fn open(path: &Path, scratch: &Path) -> Result<Self, SeekerError> {
        let file = File::open(path).map_err(|e| SeekerError::container(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| SeekerError::container(path, e))?;

        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| SeekerError::container(path, e))?;
            let name = normalize_member_name(entry.name());
            if name.is_empty() {
                continue;
            }
            members.push(ZipMember {
                index,
                name,
                is_dir: entry.is_dir(),
            });
        }
        info!("Indexed {} entries in {}", members.len(), path.display());

        Ok(ZipSource {
            path: path.to_path_buf(),
            scratch: scratch.to_path_buf(),
            archive: Some(archive),
            members,
            extracted: HashMap::new(),
            failed: HashSet::new(),
        })
    }

    fn extract(&mut self, index: usize) -> Result<PathBuf, SeekerError> {
        let scratch = self.scratch.clone();
        let archive = self
            .archive
            .as_mut()
            .ok_or_else(|| SeekerError::container(&self.path, "archive already closed"))?;

        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "entry path escapes the scratch folder")
        })?;
        let dest = scratch.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            return Ok(dest);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let copied = (|| -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(&dest)?);
            io::copy(&mut entry, &mut writer)?;
            writer.flush()
        })();
        if let Err(e) = copied {
            let _ = fs::remove_file(&dest);
            return Err(e.into());
        }
        Ok(dest)
    }
}

impl EvidenceSource for ZipSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Zip
    }

    fn search(&mut self, pattern: &Pattern) -> Result<Vec<PathBuf>, SeekerError> {
        let matched: Vec<ZipMember> = self
            .members
            .iter()
            .filter(|member| pattern.is_match(&member.name))
            .cloned()
            .collect();

        let mut paths = Vec::new();
        for member in matched {
            if let Some(dest) = self.extracted.get(&member.index) {
                paths.push(dest.clone());
                continue;
            }
            if self.failed.contains(&member.index) {
                continue;
            }
            if self.archive.is_none() {
                return Err(SeekerError::container(&self.path, "archive already closed"));
            }

            match self.extract(member.index) {
                Ok(dest) => {
                    debug!("Extracted {} to {}", member.name, dest.display());
                    self.extracted.insert(member.index, dest.clone());
                    paths.push(dest);
                }
                Err(e) => {
                    warn!(
                        "Could not write {} to the filesystem ({}): {}",
                        member.name,
                        if member.is_dir { "directory" } else { "file" },
                        e
                    );
                    self.failed.insert(member.index);
                }
            }
        }
        Ok(paths)
    }

    fn indexed(&self) -> usize {
        self.members.len()
    }

    fn extraction_failures(&self) -> usize {
        self.failed.len()
    }

    fn cleanup(&mut self) -> Result<(), SeekerError> {
        if self.archive.take().is_some() {
            debug!("Closed archive {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_search_extracts_matches() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evidence.zip");
        build_zip(
            &archive,
            &[
                ("mobile/Library/a.db", b"aaa"),
                ("mobile/Library/b.log", b"bbb"),
                ("mobile/Media/c.db", b"ccc"),
            ],
        );

        let scratch = temp_dir.path().join("scratch");
        let mut source = ZipSource::open(&archive, &scratch).unwrap();
        assert_eq!(source.indexed(), 3);

        let found = source.search(&Pattern::new("*.db").unwrap()).unwrap();
        assert_eq!(
            found,
            vec![
                scratch.join("mobile/Library/a.db"),
                scratch.join("mobile/Media/c.db"),
            ]
        );
        assert_eq!(fs::read(&found[1]).unwrap(), b"ccc");
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evidence.zip");
        build_zip(
            &archive,
            &[
                ("good/target.db", b"GOOD_ENTRY_CONTENT"),
                ("bad/target.db", b"BAD_ENTRY_UNIQUE_MARKER"),
            ],
        );

        // Flip one byte of the stored data so the CRC check fails on read
        let mut bytes = fs::read(&archive).unwrap();
        let marker = b"BAD_ENTRY_UNIQUE_MARKER";
        let pos = bytes
            .windows(marker.len())
            .position(|window| window == marker)
            .unwrap();
        bytes[pos] = b'X';
        fs::write(&archive, &bytes).unwrap();

        let scratch = temp_dir.path().join("scratch");
        let mut source = ZipSource::open(&archive, &scratch).unwrap();
        let found = source.search(&Pattern::new("**/target.db").unwrap()).unwrap();

        assert_eq!(found, vec![scratch.join("good/target.db")]);
        assert_eq!(source.extraction_failures(), 1);
        assert!(!scratch.join("bad/target.db").exists());
    }

    #[test]
    fn test_repeated_search_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evidence.zip");
        build_zip(&archive, &[("z.db", b"z"), ("a.db", b"a"), ("m.db", b"m")]);

        let scratch = temp_dir.path().join("scratch");
        let mut source = ZipSource::open(&archive, &scratch).unwrap();
        let pattern = Pattern::new("*.db").unwrap();
        let first = source.search(&pattern).unwrap();
        let second = source.search(&pattern).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], scratch.join("z.db"));

        let mut reopened = ZipSource::open(&archive, &temp_dir.path().join("scratch")).unwrap();
        assert_eq!(reopened.search(&pattern).unwrap(), first);
    }

    #[test]
    fn test_no_match_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evidence.zip");
        build_zip(&archive, &[("a.db", b"a")]);

        let mut source = ZipSource::open(&archive, temp_dir.path()).unwrap();
        assert!(source.search(&Pattern::new("*.plist").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_not_a_zip() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evidence.zip");
        fs::write(&archive, b"plain text").unwrap();
        let result = ZipSource::open(&archive, temp_dir.path());
        assert!(matches!(result, Err(SeekerError::ContainerOpen { .. })));
    }
}
