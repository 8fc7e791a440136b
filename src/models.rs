//! Data types shared by enumeration, classification, and aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Where a candidate file physically lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// A file on the local filesystem.
    Local { path: PathBuf },
    /// An object in a remote container; `name` is the full object name.
    Remote { container: String, name: String },
}

/// A delimited-text file discovered during enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFile {
    pub origin: Origin,
    /// Path relative to the scope root (base path for remote scopes), with
    /// `/` separators.
    pub relative_path: String,
    /// Last path component.
    pub file_name: String,
    /// Size in bytes as reported by the filesystem or the listing.
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl CandidateFile {
    /// Full path or object name, used for classification and messages.
    pub fn display_path(&self) -> String {
        match &self.origin {
            Origin::Local { path } => path.display().to_string(),
            Origin::Remote { name, .. } => name.clone(),
        }
    }

    pub fn container(&self) -> Option<&str> {
        match &self.origin {
            Origin::Local { .. } => None,
            Origin::Remote { container, .. } => Some(container),
        }
    }
}
