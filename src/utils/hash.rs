use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::constants::COPY_BUFFER_SIZE;

/// Calculate the SHA-256 digest of an evidence container
///
/// Returns None if:
/// - The container is larger than max_size_mb
/// - The path is not a regular file (a directory tree or a backup folder)
pub fn calculate_sha256(path: &Path, max_size_mb: u64) -> io::Result<Option<String>> {
    let metadata = std::fs::metadata(path)?;

    if !metadata.is_file() {
        return Ok(None);
    }

    if metadata.len() > max_size_mb.saturating_mul(1024 * 1024) {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}
