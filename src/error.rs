//! Error taxonomy for split and merge runs.
//!
//! Library functions return `anyhow::Result` like the rest of the crate;
//! the variants here are what they raise for conditions a caller may want
//! to tell apart (`err.downcast_ref::<ShuttleError>()`).
//!
//! | Variant | Severity |
//! |---------|----------|
//! | `SourceNotFound`, `EmptySource` | fatal for a split run |
//! | `SubfolderNotFound` | logged as a warning, never returned |
//! | `FileRead` | recorded per file, the group continues |
//! | `GroupFullyFailed` | that group is skipped, the other one still runs |
//! | `AuthResolution` | fatal, raised before any enumeration |
//! | `Upload` | logged as a warning, local output stays |

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShuttleError {
    #[error("input file '{}' not found", .0.display())]
    SourceNotFound(PathBuf),

    #[error("CSV file '{}' is empty (no header row)", .0.display())]
    EmptySource(PathBuf),

    #[error("subfolder '{name}' not found in {root}")]
    SubfolderNotFound { name: String, root: String },

    #[error("failed to read {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("all {failed} file(s) for {output} failed to read")]
    GroupFullyFailed { output: String, failed: usize },

    #[error("no usable storage credential: {0}")]
    AuthResolution(String),

    #[error("upload of {name} failed: {reason}")]
    Upload { name: String, reason: String },

    #[error("invalid storage location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("remote storage error: {0}")]
    Remote(String),
}
