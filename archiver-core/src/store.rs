//! The durable object store the archives are written to.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Error, Result};

/// A single put against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: &'static str,
    pub content_encoding: &'static str,
    /// User metadata attached to the object.
    pub metadata: HashMap<String, String>,
}

/// Key/value store with per-key strong consistency. Keys are written once; the archiver
/// never relies on overwrites.
#[trait_variant::make(ObjectStore: Send)]
#[allow(dead_code)]
pub trait LocalObjectStore {
    /// Writes the whole object. A failed put leaves nothing behind that a retry must resume.
    async fn put_object(&self, object: ArchiveObject) -> Result<()>;
}

/// [ObjectStore] held in process memory. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<(String, String), ArchiveObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<ArchiveObject> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All objects, ordered by bucket then key.
    pub fn objects(&self) -> Vec<ArchiveObject> {
        self.objects.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, object: ArchiveObject) -> Result<()> {
        let mut objects = self.objects.lock();
        let id = (object.bucket.clone(), object.key.clone());
        if objects.contains_key(&id) {
            return Err(Error::Store(format!(
                "object s3://{}/{} already exists",
                id.0, id.1
            )));
        }
        objects.insert(id, object);
        Ok(())
    }
}
