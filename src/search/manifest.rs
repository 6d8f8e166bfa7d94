use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};

use crate::constants::{MANIFEST_DB_NAME, MANIFEST_FILES_QUERY};
use crate::error::SeekerError;
use crate::search::pattern::Pattern;
use crate::search::{scratch_destination, EvidenceSource, SourceKind};

/// Evidence source over a manifest-indexed backup (iTunes / Finder style).
///
/// `Manifest.db` maps each logical relative path to a storage key; the
/// backing object lives at `<backup>/<key[0..2]>/<key>`. Matches are copied
/// into the scratch folder under their logical path.
pub struct ManifestSource {
    directory: PathBuf,
    scratch: PathBuf,
    /// logical relative path -> storage key
    files: BTreeMap<String, String>,
    extracted: HashMap<String, PathBuf>,
    failed: HashSet<String>,
}

impl ManifestSource {
    /// Read the manifest index of the backup at `directory`
    pub fn open(directory: &Path, scratch: &Path) -> Result<Self, SeekerError> {
        let manifest = directory.join(MANIFEST_DB_NAME);
        if !manifest.is_file() {
            return Err(SeekerError::container(directory, "Manifest.db not found"));
        }

        let files = read_manifest(&manifest).map_err(|e| SeekerError::container(&manifest, e))?;
        info!("Manifest lists {} files in {}", files.len(), directory.display());

        Ok(ManifestSource {
            directory: directory.to_path_buf(),
            scratch: scratch.to_path_buf(),
            files,
            extracted: HashMap::new(),
            failed: HashSet::new(),
        })
    }

    /// Location of the backing object for a storage key
    fn object_path(&self, key: &str) -> PathBuf {
        let prefix = key.get(..2).unwrap_or(key);
        self.directory.join(prefix).join(key)
    }

    fn copy_object(&self, relative: &str, key: &str) -> Result<PathBuf, SeekerError> {
        let source = self.object_path(key);
        if !source.is_file() {
            return Err(SeekerError::NotFound(source));
        }
        let dest = scratch_destination(&self.scratch, relative).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "relative path escapes the scratch folder",
            )
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &dest)?;
        Ok(dest)
    }
}

impl EvidenceSource for ManifestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Itunes
    }

    fn search(&mut self, pattern: &Pattern) -> Result<Vec<PathBuf>, SeekerError> {
        let matched: Vec<(String, String)> = self
            .files
            .iter()
            .filter(|(relative, _)| pattern.is_match(relative))
            .map(|(relative, key)| (relative.clone(), key.clone()))
            .collect();

        let mut paths = Vec::new();
        for (relative, key) in matched {
            if let Some(dest) = self.extracted.get(&relative) {
                paths.push(dest.clone());
                continue;
            }
            if self.failed.contains(&relative) {
                continue;
            }
            match self.copy_object(&relative, &key) {
                Ok(dest) => {
                    debug!("Copied {} ({}) to {}", relative, key, dest.display());
                    self.extracted.insert(relative, dest.clone());
                    paths.push(dest);
                }
                Err(e) => {
                    warn!("Could not copy {} ({}) from backup: {}", relative, key, e);
                    self.failed.insert(relative);
                }
            }
        }
        Ok(paths)
    }

    fn indexed(&self) -> usize {
        self.files.len()
    }

    fn extraction_failures(&self) -> usize {
        self.failed.len()
    }

    fn cleanup(&mut self) -> Result<(), SeekerError> {
        // The manifest connection is closed as soon as the index is read
        Ok(())
    }
}

fn read_manifest(manifest: &Path) -> Result<BTreeMap<String, String>, rusqlite::Error> {
    let db = Connection::open_with_flags(
        manifest,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut files = BTreeMap::new();
    {
        let mut stmt = db.prepare(MANIFEST_FILES_QUERY)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, relative) = row?;
            // Same relative path under several domains: first one wins
            files.entry(relative).or_insert(key);
        }
    }
    db.close().map_err(|(_, e)| e)?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_backup(dir: &Path, files: &[(&str, &str, &[u8], i64)]) {
        let db = Connection::open(dir.join(MANIFEST_DB_NAME)).unwrap();
        db.execute_batch(
            "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT, flags INTEGER, file BLOB);",
        )
        .unwrap();
        for (key, relative, data, flags) in files {
            db.execute(
                "INSERT INTO Files (fileID, domain, relativePath, flags) VALUES (?1, 'HomeDomain', ?2, ?3)",
                rusqlite::params![key, relative, flags],
            )
            .unwrap();
            if *flags == 1 {
                let object_dir = dir.join(&key[..2]);
                fs::create_dir_all(&object_dir).unwrap();
                fs::write(object_dir.join(key), data).unwrap();
            }
        }
    }

    #[test]
    fn test_search_copies_backing_objects() {
        let temp_dir = TempDir::new().unwrap();
        let backup = temp_dir.path().join("backup");
        fs::create_dir_all(&backup).unwrap();
        build_backup(
            &backup,
            &[
                ("31bb7ba8914766d4ba40d6dfb6113c8b614be442", "Library/AddressBook/AddressBook.sqlitedb", b"ab", 1),
                ("3d0d7e5fb2ce288813306e4d4636395e047a3d28", "Library/SMS/sms.db", b"sms", 1),
                ("aaaa000000000000000000000000000000000000", "Library/SMS", b"", 2),
            ],
        );

        let scratch = temp_dir.path().join("scratch");
        let mut source = ManifestSource::open(&backup, &scratch).unwrap();
        // directories (flags=2) are not part of the index
        assert_eq!(source.indexed(), 2);

        let found = source.search(&Pattern::new("**/sms.db").unwrap()).unwrap();
        assert_eq!(found, vec![scratch.join("Library/SMS/sms.db")]);
        assert_eq!(fs::read(&found[0]).unwrap(), b"sms");
    }

    #[test]
    fn test_missing_object_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let backup = temp_dir.path().join("backup");
        fs::create_dir_all(&backup).unwrap();
        build_backup(
            &backup,
            &[
                ("1111111111111111111111111111111111111111", "Library/a.db", b"a", 1),
                ("2222222222222222222222222222222222222222", "Library/b.db", b"b", 1),
            ],
        );
        fs::remove_file(backup.join("22/2222222222222222222222222222222222222222")).unwrap();

        let scratch = temp_dir.path().join("scratch");
        let mut source = ManifestSource::open(&backup, &scratch).unwrap();
        let found = source.search(&Pattern::new("Library/*.db").unwrap()).unwrap();
        assert_eq!(found, vec![scratch.join("Library/a.db")]);
        assert_eq!(source.extraction_failures(), 1);
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let result = ManifestSource::open(temp_dir.path(), temp_dir.path());
        assert!(matches!(result, Err(SeekerError::ContainerOpen { .. })));
    }
}
