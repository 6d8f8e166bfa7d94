//! Typed errors for the evidence and artifact layers.
//!
//! Application code works with `anyhow::Result`; these enums exist where a
//! caller needs to tell failure kinds apart (a missing file versus an
//! unreadable container, an unknown artifact versus a duplicate one).

use std::path::PathBuf;

/// Errors raised while opening containers and resolving patterns
#[derive(Debug, thiserror::Error)]
pub enum SeekerError {
    #[error("Failed to open evidence container {path}: {reason}")]
    ContainerOpen { path: PathBuf, reason: String },

    #[error("Invalid search pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("File {0} was not found")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl SeekerError {
    pub(crate) fn container(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SeekerError::ContainerOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while building the registry or changing selection
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact[{0:?}] does not exist")]
    NotFound(String),

    #[error("Artifact identifier {0:?} is registered more than once")]
    Duplicate(String),

    #[error("Artifact {name:?} is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SeekerError::NotFound(PathBuf::from("/evidence/missing.db"));
        assert_eq!(err.to_string(), "File /evidence/missing.db was not found");

        let err = ArtifactError::NotFound("NO_SUCH".to_string());
        assert!(err.to_string().contains("\"NO_SUCH\""));

        let err = SeekerError::container("/evidence/bad.tar", "truncated header");
        assert!(err.to_string().contains("bad.tar"));
        assert!(err.to_string().contains("truncated header"));
    }
}
