//! Evidence source abstraction.
//!
//! Every container kind (plain directory tree, tar archive, zip archive,
//! manifest-indexed backup) is exposed through the same two-phase shape:
//! the container is indexed once when the source is opened, and every
//! pattern lookup afterwards filters that index. Archive backends extract
//! matching members into a scratch folder so artifacts always receive real
//! filesystem paths.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Seeker                    │
//! │   resolve(pattern) / find(patterns)     │
//! ├─────────────────────────────────────────┤
//! │             HandleCache                 │
//! │  pattern -> HandleSet (db/stream/path)  │
//! ├─────────────────────────────────────────┤
//! │            EvidenceSource               │
//! │  ┌────────┬───────┬───────┬──────────┐  │
//! │  │ FS dir │  Tar  │  Zip  │ Manifest │  │
//! │  └────────┴───────┴───────┴──────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use leapp_engine::search::{Seeker, SourceKind, CacheOptions, SearchOptions};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut seeker = Seeker::open(
//!     SourceKind::Tar,
//!     Path::new("/evidence/extraction.tar.gz"),
//!     Path::new("/tmp/case/data"),
//!     CacheOptions::default(),
//! )?;
//!
//! let found = seeker.find(&["**/AddressBook.sqlitedb"], SearchOptions::default())?;
//! for handle in found.iter() {
//!     println!("{}", handle.path().display());
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SeekerError;

mod directory;
mod handles;
mod manifest;
mod pattern;
mod seeker;
mod tar_source;
mod zip_source;

pub use directory::DirectorySource;
pub use handles::{CacheOptions, Handle, HandleCache, HandleKind, HandleSet};
pub use manifest::ManifestSource;
pub use pattern::{normalize_member_name, normalize_path, Pattern};
pub use seeker::{Found, SearchOptions, Seeker};
pub use tar_source::TarSource;
pub use zip_source::ZipSource;

/// Kind of evidence container handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Extracted filesystem tree
    Fs,
    /// Tar archive, optionally gzip compressed
    Tar,
    /// Zip archive
    Zip,
    /// iTunes style backup indexed by Manifest.db
    Itunes,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Fs => write!(f, "fs"),
            SourceKind::Tar => write!(f, "tar"),
            SourceKind::Zip => write!(f, "zip"),
            SourceKind::Itunes => write!(f, "itunes"),
        }
    }
}

/// A container that can resolve glob patterns to evidence locations.
///
/// Implementations index the container once on construction. `search`
/// never fails because nothing matched; it returns an empty list instead.
/// Failures on single members are logged and counted, not returned.
#[cfg_attr(test, mockall::automock)]
pub trait EvidenceSource {
    /// Kind of container this source reads
    fn kind(&self) -> SourceKind;

    /// Resolve a pattern to real paths, extracting members when needed
    fn search(&mut self, pattern: &Pattern) -> Result<Vec<PathBuf>, SeekerError>;

    /// Number of locations in the index
    fn indexed(&self) -> usize;

    /// Members that matched a pattern but could not be extracted
    fn extraction_failures(&self) -> usize;

    /// Release the container-level resource. Safe to call more than once.
    fn cleanup(&mut self) -> Result<(), SeekerError>;
}

/// Open the evidence source matching `kind`.
///
/// `scratch` receives extracted members; it is unused for directory trees.
pub fn open_source(
    kind: SourceKind,
    input: &Path,
    scratch: &Path,
) -> Result<Box<dyn EvidenceSource>, SeekerError> {
    let source: Box<dyn EvidenceSource> = match kind {
        SourceKind::Fs => Box::new(DirectorySource::open(input)?),
        SourceKind::Tar => Box::new(TarSource::open(input, scratch)?),
        SourceKind::Zip => Box::new(ZipSource::open(input, scratch)?),
        SourceKind::Itunes => Box::new(ManifestSource::open(input, scratch)?),
    };
    Ok(source)
}

/// Destination below `scratch` for a normalized member name.
///
/// Returns `None` for names that would escape the scratch folder.
pub(crate) fn scratch_destination(scratch: &Path, member: &str) -> Option<PathBuf> {
    let mut dest = scratch.to_path_buf();
    for part in member.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ if part.contains(':') && cfg!(windows) => dest.push(part.replace(':', "_")),
            _ => dest.push(part),
        }
    }
    if dest == scratch {
        return None;
    }
    Some(dest)
}
