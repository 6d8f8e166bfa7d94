use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};

use crate::constants::{
    BACKUP_PAGES_PER_STEP, DEFAULT_MEMORY_DB_THRESHOLD, DEFAULT_NAMES_ONLY_THRESHOLD, SQLITE_MAGIC,
};
use crate::error::SeekerError;

/// Tuning knobs for the handle cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Patterns matching more locations than this only keep paths
    pub names_only_threshold: usize,
    /// Databases smaller than this many bytes are copied into memory
    pub memory_db_threshold: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            names_only_threshold: DEFAULT_NAMES_ONLY_THRESHOLD,
            memory_db_threshold: DEFAULT_MEMORY_DB_THRESHOLD,
        }
    }
}

/// What a handle holds open
#[derive(Debug)]
pub enum HandleKind {
    /// Read-only SQLite connection, possibly an in-memory copy
    Database(Connection),
    /// Read-only byte stream
    Stream(File),
    /// No open descriptor, only the location
    PathOnly,
}

/// A resolved evidence location.
///
/// Handles are owned by the [`HandleCache`]; artifacts borrow them for the
/// duration of one processing call.
#[derive(Debug)]
pub struct Handle {
    path: PathBuf,
    kind: HandleKind,
    memory_resident: bool,
}

impl Handle {
    /// A handle that keeps no descriptor open
    pub fn path_only(path: impl Into<PathBuf>) -> Self {
        Handle {
            path: path.into(),
            kind: HandleKind::PathOnly,
            memory_resident: false,
        }
    }

    /// Open the most useful handle for `path`: a database connection when the
    /// file is a SQLite database, a byte stream otherwise.
    pub fn open(path: &Path, options: &CacheOptions) -> Result<Self, SeekerError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SeekerError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            return Ok(Handle::path_only(path));
        }

        if has_sqlite_header(path)? {
            match open_database(path, options.memory_db_threshold) {
                Ok((db, memory_resident)) => {
                    return Ok(Handle {
                        path: path.to_path_buf(),
                        kind: HandleKind::Database(db),
                        memory_resident,
                    })
                }
                Err(e) => debug!("{} is not a usable database ({}), opening as stream", path.display(), e),
            }
        }

        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SeekerError::NotFound(path.to_path_buf()),
            _ => e.into(),
        })?;
        Ok(Handle {
            path: path.to_path_buf(),
            kind: HandleKind::Stream(file),
            memory_resident: false,
        })
    }

    /// Origin path of the evidence
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &HandleKind {
        &self.kind
    }

    /// The database connection, if this handle holds one
    pub fn database(&self) -> Option<&Connection> {
        match &self.kind {
            HandleKind::Database(db) => Some(db),
            _ => None,
        }
    }

    /// The byte stream, if this handle holds one
    pub fn stream(&self) -> Option<&File> {
        match &self.kind {
            HandleKind::Stream(file) => Some(file),
            _ => None,
        }
    }

    /// Whether a descriptor or connection is held open
    pub fn is_open(&self) -> bool {
        !matches!(self.kind, HandleKind::PathOnly)
    }

    /// Whether the database was copied into memory
    pub fn is_memory_resident(&self) -> bool {
        self.memory_resident
    }

    /// Read the whole evidence file, from the open stream when there is one
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.kind {
            HandleKind::Stream(file) => {
                let mut reader = file;
                reader.seek(SeekFrom::Start(0))?;
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                reader.seek(SeekFrom::Start(0))?;
                Ok(buf)
            }
            _ => fs::read(&self.path),
        }
    }

    fn rewind(&self) -> io::Result<()> {
        if let HandleKind::Stream(file) = &self.kind {
            let mut reader = file;
            reader.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }
}

/// All handles resolved for one pattern, in resolution order
#[derive(Debug)]
pub struct HandleSet {
    pattern: String,
    handles: Vec<Handle>,
}

impl HandleSet {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Handle> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn first(&self) -> Option<&Handle> {
        self.handles.first()
    }

    /// Origin paths of every handle
    pub fn paths(&self) -> Vec<&Path> {
        self.handles.iter().map(Handle::path).collect()
    }
}

impl<'a> IntoIterator for &'a HandleSet {
    type Item = &'a Handle;
    type IntoIter = std::slice::Iter<'a, Handle>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.iter()
    }
}

/// Cache of opened evidence handles keyed by search pattern.
///
/// A pattern is resolved at most once; later lookups get the same
/// [`HandleSet`] until it is invalidated. Not meant to be shared between
/// threads: every mutation goes through `&mut self`.
#[derive(Debug, Default)]
pub struct HandleCache {
    options: CacheOptions,
    sets: HashMap<String, HandleSet>,
    logged: HashSet<String>,
}

impl HandleCache {
    pub fn new(options: CacheOptions) -> Self {
        HandleCache {
            options,
            sets: HashMap::new(),
            logged: HashSet::new(),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Open handles for `files` and cache them under `pattern`.
    ///
    /// Does nothing when the pattern is already cached. On failure nothing is
    /// cached for the pattern, so the next lookup resolves it again.
    pub fn add(&mut self, pattern: &str, files: &[PathBuf], names_only: bool) -> Result<(), SeekerError> {
        if self.sets.contains_key(pattern) || files.is_empty() {
            return Ok(());
        }

        let names_only = names_only || files.len() > self.options.names_only_threshold;
        let mut handles = Vec::with_capacity(files.len());
        for path in files {
            let handle = if names_only {
                Handle::path_only(path)
            } else {
                Handle::open(path, &self.options)?
            };
            handles.push(handle);
        }

        debug!(
            "Cached {} handle(s) for {}{}",
            handles.len(),
            pattern,
            if names_only { " (names only)" } else { "" }
        );
        self.sets.insert(
            pattern.to_string(),
            HandleSet {
                pattern: pattern.to_string(),
                handles,
            },
        );
        Ok(())
    }

    /// Cached handles for `pattern`, with byte streams rewound to the start.
    ///
    /// The first access to a pattern logs where its files are located.
    pub fn get(&mut self, pattern: &str) -> Option<&HandleSet> {
        let set = self.sets.get(pattern)?;

        if self.logged.insert(pattern.to_string()) {
            let locations: Vec<String> = set
                .iter()
                .map(|handle| format!("    {}", handle.path().display()))
                .collect();
            info!("Files for {} located at:\n{}", pattern, locations.join("\n"));
        }

        for handle in set.iter() {
            if let Err(e) = handle.rewind() {
                warn!("Failed to rewind {}: {}", handle.path().display(), e);
            }
        }
        Some(set)
    }

    /// Cached handles for `pattern` without logging or rewinding
    pub fn peek(&self, pattern: &str) -> Option<&HandleSet> {
        self.sets.get(pattern)
    }

    /// Drop (and close) the handles cached for `pattern`
    pub fn invalidate(&mut self, pattern: &str) -> bool {
        self.logged.remove(pattern);
        self.sets.remove(pattern).is_some()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.sets.contains_key(pattern)
    }

    /// Cached patterns, sorted
    pub fn patterns(&self) -> Vec<&str> {
        let mut patterns: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        patterns.sort_unstable();
        patterns
    }

    /// Total number of cached handles across all patterns
    pub fn len(&self) -> usize {
        self.sets.values().map(HandleSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop every cached handle
    pub fn clear(&mut self) {
        self.sets.clear();
        self.logged.clear();
    }
}

fn has_sqlite_header(path: &Path) -> Result<bool, SeekerError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SeekerError::NotFound(path.to_path_buf()),
        _ => e.into(),
    })?;
    let mut header = [0u8; 16];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Open a database read-only; small ones are copied into memory and the
/// disk connection closed.
fn open_database(path: &Path, memory_threshold: u64) -> Result<(Connection, bool), rusqlite::Error> {
    let disk = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let page_size: i64 = disk.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let page_count: i64 = disk.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let size = (page_size.max(0) as u64).saturating_mul(page_count.max(0) as u64);

    if size >= memory_threshold {
        debug!("Keeping {} ({} bytes) on disk", path.display(), size);
        return Ok((disk, false));
    }

    let mut memory = Connection::open_in_memory()?;
    {
        let backup = Backup::new(&disk, &mut memory)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
    }
    disk.close().map_err(|(_, e)| e)?;
    debug!("Copied {} ({} bytes) into memory", path.display(), size);
    Ok((memory, true))
}
