//! In-memory [`ObjectStore`] for tests and dry runs.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use anyhow::Result;

use super::{ObjectStore, RemoteObject};
use crate::error::ShuttleError;

/// A container held in a sorted map.
///
/// Individual downloads and uploads can be made to fail, which is how the
/// merge pipeline's failure isolation is exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    container: String,
    objects: RefCell<BTreeMap<String, Vec<u8>>>,
    failing_downloads: HashSet<String>,
    fail_uploads: bool,
}

impl MemoryStore {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Self::default()
        }
    }

    /// Add an object (builder style).
    pub fn with_object(self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.objects.borrow_mut().insert(name.into(), data.into());
        self
    }

    /// Make downloads of `name` fail.
    pub fn with_failing_download(mut self, name: impl Into<String>) -> Self {
        self.failing_downloads.insert(name.into());
        self
    }

    /// Make every upload fail.
    pub fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Current contents of object `name`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.borrow().keys().cloned().collect()
    }
}

impl ObjectStore for MemoryStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        Ok(self
            .objects
            .borrow()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, data)| RemoteObject {
                name: name.clone(),
                size: data.len() as u64,
                last_modified: None,
                etag: None,
            })
            .collect())
    }

    fn download(&self, name: &str) -> Result<Vec<u8>> {
        if self.failing_downloads.contains(name) {
            return Err(ShuttleError::Remote(format!("download of {} refused", name)).into());
        }
        self.objects
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| ShuttleError::Remote(format!("object {} not found", name)).into())
    }

    fn upload(&self, name: &str, data: &[u8]) -> Result<()> {
        if self.fail_uploads {
            return Err(ShuttleError::Remote(format!("upload of {} refused", name)).into());
        }
        self.objects
            .borrow_mut()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }
}
