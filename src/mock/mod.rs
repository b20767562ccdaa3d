//! Mock object storage
//!
//! In-memory [`ObjectStorage`] implementation with failure injection,
//! used by unit and integration tests to exercise the orchestrator's
//! error paths without a real provider.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use crate::job::TransferMetadata;
use crate::storage::{ObjectStorage, StorageError, UploadOutcome, STATUS_OK};

/// An object held by the mock, bytes plus the metadata it was stored with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    /// Status code returned by subsequent uploads instead of 200.
    upload_status: Option<u16>,
    /// When set, the next operation fails with a transport error.
    fail_transport: bool,
}

/// Configurable in-memory object storage.
#[derive(Debug, Default)]
pub struct MockObjectStorage {
    state: Mutex<MockState>,
}

impl MockObjectStorage {
    /// Empty storage with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style convenience: storage with one existing bucket.
    pub fn with_bucket(name: &str) -> Self {
        let storage = Self::new();
        storage.create_bucket(name);
        storage
    }

    /// Create a bucket.
    pub fn create_bucket(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(name.to_string())
            .or_default();
    }

    /// Make subsequent uploads report `status` instead of 200.
    pub fn set_upload_status(&self, status: u16) {
        self.state.lock().unwrap().upload_status = Some(status);
    }

    /// Make the next operation fail with a transport error.
    pub fn fail_next_transport(&self) {
        self.state.lock().unwrap().fail_transport = true;
    }

    /// Fetch an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Number of objects in a bucket (0 when the bucket is missing).
    pub fn object_count(&self, bucket: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_transport {
            state.fail_transport = false;
            return Err(StorageError::Transport("injected transport error".to_string()));
        }

        if let Some(status) = state.upload_status {
            if status != STATUS_OK {
                return Ok(UploadOutcome {
                    status_code: status,
                });
            }
        }

        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::Transport(format!("no such bucket: {}", bucket)))?;

        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );

        Ok(UploadOutcome {
            status_code: STATUS_OK,
        })
    }
}

impl ObjectStorage for MockObjectStorage {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transport {
            state.fail_transport = false;
            return Err(StorageError::Transport("injected transport error".to_string()));
        }
        Ok(state.buckets.contains_key(bucket))
    }

    fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        let bytes = std::fs::read(source)?;
        self.store(bucket, key, bytes, metadata)
    }

    fn upload_reader(
        &self,
        bucket: &str,
        key: &str,
        mut reader: Box<dyn Read + Send>,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.store(bucket, key, bytes, metadata)
    }
}
