//! Utility functions around a processing run.
//!
//! ## Components
//!
//! - **Hashing**: SHA-256 of the evidence container for the run record
//! - **Summary**: JSON run summary written next to the reports
//!
//! ### Hashing a Container
//!
//! ```no_run
//! use leapp_engine::utils::hash::calculate_sha256;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let container = Path::new("/evidence/extraction.tar");
//! match calculate_sha256(container, 64 * 1024)? {
//!     Some(hash) => println!("SHA-256: {}", hash),
//!     None => println!("Not hashed (directory or over the size limit)"),
//! }
//! # Ok(())
//! # }
//! ```

/// Run summary generation
pub mod summary;

/// Cryptographic hash calculation utilities
pub mod hash;
