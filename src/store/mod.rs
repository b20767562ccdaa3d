//! Content-addressed archive store
//!
//! The internal persistence layer is keyed by a logical
//! {context, component, area, item, path, filename} address. This module
//! defines the address and handle types, the narrow [`ContentStore`]
//! interface the orchestrator consumes, a filesystem-backed implementation
//! and the [`Publisher`] that enforces supersede semantics.

mod fs;
mod publisher;

pub use fs::FsContentStore;
pub use publisher::Publisher;

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from content store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot publish with an empty file name")]
    EmptyFileName,

    #[error("source file is not readable: {0}")]
    Unreadable(PathBuf),

    #[error("no artifact stored at address hash {0}")]
    NotFound(String),

    #[error("corrupt store record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Logical address of an artifact in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAddress {
    pub context_id: i64,
    pub component: String,
    pub area: String,
    pub item_id: i64,
    pub path: String,
    pub file_name: String,
}

impl FileAddress {
    /// Deterministic hash of the full address tuple.
    ///
    /// Two artifacts share a hash exactly when they occupy the same
    /// logical slot, which is what supersede semantics key on.
    pub fn address_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}\n{}\n{}\n{}\n{}\n{}",
                self.context_id, self.component, self.area, self.item_id, self.path, self.file_name
            )
            .as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

/// Reference to an artifact persisted in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifactHandle {
    /// Logical address the artifact lives at.
    pub address: FileAddress,

    /// SHA-256 of the stored bytes.
    pub content_sha256: String,

    /// Size in bytes.
    pub size: u64,

    /// Id of the user who owns the artifact.
    pub owner_id: i64,

    /// Creation timestamp, stamped at publish time.
    pub created_at: DateTime<Utc>,

    /// Modification timestamp, stamped at publish time.
    pub modified_at: DateTime<Utc>,
}

/// Narrow interface the pipeline consumes from the content store.
///
/// `delete`/`create_from_path` at a shared address are not atomic as a
/// pair; concurrent publishers to the same address race with
/// last-write-wins semantics.
pub trait ContentStore {
    /// Whether an artifact exists at the address.
    fn exists(&self, address: &FileAddress) -> bool;

    /// Fetch the handle stored at the address, if any.
    fn get(&self, address: &FileAddress) -> Option<StoredArtifactHandle>;

    /// Remove the artifact at the address.
    fn delete(&self, address: &FileAddress) -> Result<(), StoreError>;

    /// Ingest the file at `source` under `address`.
    ///
    /// Does not remove `source`; ownership transfer is the publisher's
    /// contract, not the store's.
    fn create_from_path(
        &self,
        address: &FileAddress,
        source: &Path,
        owner_id: i64,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<StoredArtifactHandle, StoreError>;

    /// Open the stored artifact for reading.
    fn open(&self, address: &FileAddress) -> Result<Box<dyn Read + Send>, StoreError>;
}
