//! Content store publisher.
//!
//! Publishing replaces whatever already occupies the logical address
//! (supersede, not versioning) and consumes the source file: once the
//! artifact is safely in the store, the temp copy is removed here rather
//! than by the orchestrator's cleanup step.

use std::fs::{self, File};
use std::path::Path;

use chrono::Utc;

use super::{ContentStore, FileAddress, StoreError, StoredArtifactHandle};

/// Publishes produced archives into a content store.
pub struct Publisher<'a> {
    store: &'a dyn ContentStore,
}

impl<'a> Publisher<'a> {
    /// Create a publisher over the given store.
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self { store }
    }

    /// Publish the file at `source` under `address`, superseding any
    /// prior artifact at the same address.
    ///
    /// On success the source file has been removed (ownership moved into
    /// the store). On failure the source is left in place for the
    /// orchestrator's guaranteed cleanup.
    pub fn publish(
        &self,
        address: &FileAddress,
        source: &Path,
        owner_id: i64,
    ) -> Result<StoredArtifactHandle, StoreError> {
        if address.file_name.is_empty() {
            return Err(StoreError::EmptyFileName);
        }
        if File::open(source).is_err() {
            return Err(StoreError::Unreadable(source.to_path_buf()));
        }

        // Last writer wins: an existing artifact at this address is
        // assumed stale and dropped before ingesting the new one.
        if self.store.exists(address) {
            self.store.delete(address)?;
        }

        let now = Utc::now();
        let handle = self
            .store
            .create_from_path(address, source, owner_id, now, now)?;

        // The archive now lives in the store. If this unlink fails the
        // orchestrator's cleanup guard retries and reports a warning.
        let _ = fs::remove_file(source);

        Ok(handle)
    }
}
