//! Object storage gateway
//!
//! Uploads finished archives to a bucket/key with descriptive metadata and
//! probes bucket existence as a precondition check. The gateway is a trait
//! so the orchestrator and tests run against an in-memory implementation
//! (see [`crate::mock`]) while production uses the S3-backed [`S3Gateway`].
//!
//! No retry lives at this layer: a caller wanting retries wraps the whole
//! orchestration.

mod s3;

pub use s3::S3Gateway;

use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::job::TransferMetadata;

/// The one status code the pipeline treats as a successful upload.
pub const STATUS_OK: u16 = 200;

/// Errors from object storage operations.
///
/// Status-code failures are not errors at this layer; they come back in
/// [`UploadOutcome`] so the caller decides what a non-200 means.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport or credential failure talking to the provider.
    #[error("object storage transport error: {0}")]
    Transport(String),

    /// Local I/O failure reading the upload source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an upload attempt that reached the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOutcome {
    /// HTTP status code reported by the provider.
    pub status_code: u16,
}

impl UploadOutcome {
    /// Whether the provider accepted the object.
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Gateway to an object-storage provider.
///
/// Two upload shapes cover one semantic operation: `upload_file` streams
/// straight from a local path, `upload_reader` takes an already-open
/// handle (the CLI export path reads out of the content store).
pub trait ObjectStorage {
    /// Existence probe for a bucket. Never mutates anything.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Upload a local file to `bucket`/`key`, attaching `metadata`.
    fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError>;

    /// Upload from an open reader to `bucket`/`key`, attaching `metadata`.
    ///
    /// The reader is consumed and dropped on every exit path.
    fn upload_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: Box<dyn Read + Send>,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError>;
}
