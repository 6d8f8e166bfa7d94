//! Global constants for the leapp engine.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Handle cache constants
/// Patterns resolving to more locations than this keep path-only handles
pub const DEFAULT_NAMES_ONLY_THRESHOLD: usize = 10;

/// Databases smaller than this are copied into memory (40MB)
pub const DEFAULT_MEMORY_DB_THRESHOLD: u64 = 40 * 1024 * 1024;

/// Header every SQLite 3 database file starts with
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Pages copied per step when promoting a database into memory (-1 = all)
pub const BACKUP_PAGES_PER_STEP: i32 = -1;

// Scheduler constants
/// Queue priority of core (mandatory) artifacts
pub const CORE_PRIORITY: u8 = 1;

/// Queue priority of optional artifacts
pub const DEFAULT_PRIORITY: u8 = 10;

// Evidence source constants
/// Index database of a manifest-indexed (iTunes style) backup
pub const MANIFEST_DB_NAME: &str = "Manifest.db";

/// Query listing regular files of a manifest-indexed backup
pub const MANIFEST_FILES_QUERY: &str =
    "SELECT fileID, relativePath FROM Files WHERE flags=1";

/// Buffer size used when copying extracted members (1MB)
pub const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Symbolic links followed inside an archive before giving up
pub const MAX_SYMLINK_DEPTH: usize = 8;

/// Maximum container size hashed for the run summary (in MB)
pub const MAX_HASH_SIZE_MB: u64 = 64 * 1024;

// Output layout constants
/// Scratch folder (below the output folder) receiving extracted members
pub const SCRATCH_DIR_NAME: &str = "data";

/// Folder (below the output folder) receiving artifact reports
pub const REPORT_DIR_NAME: &str = "reports";

/// Run log file name
pub const LOG_FILE_NAME: &str = "leapp.log";

/// Run summary file name
pub const SUMMARY_FILE_NAME: &str = "run_summary.json";
