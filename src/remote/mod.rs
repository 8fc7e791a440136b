//! Remote object storage seam.
//!
//! The merger needs only three operations from a remote container: list by
//! name prefix, download an object, and upload an object with overwrite.
//! [`ObjectStore`] captures exactly that. [`AzureBlobStore`] implements it
//! over the Blob REST API and [`MemoryStore`] keeps objects in memory for
//! tests.
//!
//! Credentials are resolved once, before any store is built (see
//! [`credentials`]). Stores never probe for credentials themselves.
//!
//! [`AzureBlobStore`]: crate::connector_azure::AzureBlobStore

pub mod credentials;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use credentials::{Credential, CredentialSource};
pub use memory::MemoryStore;

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    /// Full object name within the container.
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// A container of named objects.
///
/// Implementations report failures as errors and never retry; resilience
/// belongs to the transport underneath.
pub trait ObjectStore {
    /// Container name, used for provenance columns and messages.
    fn container(&self) -> &str;

    /// All objects whose name starts with `prefix`, in listing order.
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Full contents of object `name`.
    fn download(&self, name: &str) -> Result<Vec<u8>>;

    /// Create or overwrite object `name`.
    fn upload(&self, name: &str, data: &[u8]) -> Result<()>;
}
