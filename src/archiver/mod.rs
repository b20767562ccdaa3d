//! Archival orchestrator
//!
//! Takes a produced archive plus its job metadata, routes it to exactly
//! one destination (content store, local directory or object storage) and
//! guarantees the source temp file is gone once orchestration finishes,
//! success or failure. The one exception is import mode: import jobs are
//! never archived and the caller still needs the working file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Config, StoragePolicy};
use crate::destination::{self, DestinationDescriptor, DestinationError};
use crate::job::{ArchiveJob, BackupMode, BackupType, TransferMetadata};
use crate::perm::apply_mode;
use crate::sink::{LocalDirSink, SinkError};
use crate::storage::{ObjectStorage, StorageError};
use crate::store::{ContentStore, FileAddress, Publisher, StoreError, StoredArtifactHandle};

/// Primary error kinds of an archival run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Bad URL, missing directory or missing bucket. Not retryable;
    /// fix the configuration.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// The external transfer did not complete. The caller may retry the
    /// whole job.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// Content store ingestion failed.
    #[error("publish failed: {0}")]
    PublishFailed(#[from] StoreError),

    /// The job was not in a state that allows archiving.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

impl ArchiveError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ArchiveError::PreconditionFailed(_) => 10,
            ArchiveError::InvalidDestination(_) => 20,
            ArchiveError::TransferFailed(_) => 30,
            ArchiveError::PublishFailed(_) => 40,
        }
    }
}

impl From<DestinationError> for ArchiveError {
    fn from(e: DestinationError) -> Self {
        ArchiveError::InvalidDestination(e.to_string())
    }
}

impl From<SinkError> for ArchiveError {
    fn from(e: SinkError) -> Self {
        ArchiveError::InvalidDestination(e.to_string())
    }
}

impl From<StorageError> for ArchiveError {
    fn from(e: StorageError) -> Self {
        ArchiveError::TransferFailed(e.to_string())
    }
}

/// Successful run: the stored handle (None when the archive was routed
/// externally only) plus any non-fatal warnings, cleanup included.
#[derive(Debug)]
pub struct ArchiveOutcome {
    pub handle: Option<StoredArtifactHandle>,
    pub warnings: Vec<String>,
}

/// Failed run: the primary error plus secondary warnings (a failed
/// cleanup never masks the primary error). No route publishes to the
/// content store before a later step can fail, so a failed run never
/// leaves a stored handle behind.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ArchiveFailure {
    #[source]
    pub error: ArchiveError,
    pub warnings: Vec<String>,
}

impl ArchiveFailure {
    /// Process exit code for the primary error.
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// Removes the source file when orchestration ends, however it ends.
///
/// Armed from the moment the orchestrator takes ownership of the job.
/// `finish` runs the cleanup on the normal path and reports a failed
/// unlink as a warning; `Drop` is the backstop for unwinds.
struct SourceGuard {
    path: PathBuf,
    armed: bool,
}

impl SourceGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn finish(mut self) -> Option<String> {
        self.armed = false;
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                return Some(format!(
                    "cleanup failed: could not remove {}: {}",
                    self.path.display(),
                    e
                ));
            }
        }
        None
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Compute the content-store address a job's archive belongs at.
///
/// The base slot follows the backup type; hub and anonymous/userless
/// general backups divert into per-user areas; automated backups get
/// their own area.
pub fn archive_address(job: &ArchiveJob) -> FileAddress {
    let mut component = "backup".to_string();
    let (mut context_id, area, mut item_id) = match job.kind {
        BackupType::Course => (job.course_id, "course", 0),
        BackupType::Section => (job.course_id, "section", job.container_id),
        BackupType::Activity => (job.container_id, "activity", 0),
    };
    let mut area = area.to_string();

    match job.mode {
        BackupMode::Hub => {
            // Hub uploads never carry user info; they stage in the
            // owner's "tohub" area until the upload finishes.
            context_id = job.owner_id;
            component = "user".to_string();
            area = "tohub".to_string();
            item_id = 0;
        }
        BackupMode::General if !job.has_user_data || job.is_anonymised => {
            // Userless or anonymised backups belong to the owner, who
            // maintains that area themselves.
            context_id = job.owner_id;
            component = "user".to_string();
            area = "backup".to_string();
            item_id = 0;
        }
        BackupMode::Automated => {
            area = "automated".to_string();
        }
        _ => {}
    }

    FileAddress {
        context_id,
        component,
        area,
        item_id,
        path: "/".to_string(),
        file_name: job.file_name.clone(),
    }
}

/// Orchestrates the archival of produced backup files.
pub struct Archiver<'a> {
    config: &'a Config,
    object_storage: Option<&'a dyn ObjectStorage>,
    content_store: &'a dyn ContentStore,
}

impl<'a> Archiver<'a> {
    /// Create an orchestrator. `object_storage` may be `None` when no
    /// gateway is configured; any route that needs one then fails with
    /// `InvalidDestination`.
    pub fn new(
        config: &'a Config,
        object_storage: Option<&'a dyn ObjectStorage>,
        content_store: &'a dyn ContentStore,
    ) -> Self {
        Self {
            config,
            object_storage,
            content_store,
        }
    }

    /// Archive one produced backup file.
    ///
    /// Exactly one destination receives the archive. Whatever happens,
    /// the source file no longer exists when this returns - except for
    /// import jobs, which are rejected before the pipeline takes
    /// ownership and keep their working file.
    pub fn store_backup_file(&self, job: &ArchiveJob) -> Result<ArchiveOutcome, ArchiveFailure> {
        if job.mode == BackupMode::Import {
            return Ok(ArchiveOutcome {
                handle: None,
                warnings: Vec::new(),
            });
        }

        let guard = SourceGuard::new(job.source_path.clone());
        let mut warnings = Vec::new();
        let result = self.dispatch(job, &mut warnings);

        // Guaranteed cleanup: runs on success and failure alike, and a
        // failed unlink becomes a warning rather than the result.
        if let Some(warning) = guard.finish() {
            warnings.push(warning);
        }

        match result {
            Ok(handle) => Ok(ArchiveOutcome { handle, warnings }),
            Err(error) => Err(ArchiveFailure { error, warnings }),
        }
    }

    fn dispatch(
        &self,
        job: &ArchiveJob,
        warnings: &mut Vec<String>,
    ) -> Result<Option<StoredArtifactHandle>, ArchiveError> {
        if job.file_name.is_empty() {
            return Err(ArchiveError::PreconditionFailed(
                "job has an empty file name".to_string(),
            ));
        }
        if File::open(&job.source_path).is_err() {
            return Err(ArchiveError::PreconditionFailed(format!(
                "source file is not readable: {}",
                job.source_path.display()
            )));
        }

        if job.mode == BackupMode::Automated && self.config.storage_policy.uses_external() {
            self.copy_external(job, warnings)?;
            if self.config.storage_policy == StoragePolicy::ExternalOnly {
                // External destination is the sole copy; the cleanup
                // step removes the source and nothing is published.
                return Ok(None);
            }
        }

        let publisher = Publisher::new(self.content_store);
        let handle = publisher.publish(&archive_address(job), &job.source_path, job.owner_id)?;
        Ok(Some(handle))
    }

    /// Copy the archive to the configured external destination.
    fn copy_external(&self, job: &ArchiveJob, warnings: &mut Vec<String>) -> Result<(), ArchiveError> {
        let dest = self.config.external_destination.as_str();
        if dest.is_empty() {
            return Err(ArchiveError::InvalidDestination(
                "external storage is enabled but no destination is configured".to_string(),
            ));
        }

        match destination::resolve(dest)? {
            DestinationDescriptor::ObjectStore { bucket, prefix } => {
                let storage = self.object_storage()?;
                if !storage.bucket_exists(&bucket)? {
                    return Err(ArchiveError::InvalidDestination(format!(
                        "bucket does not exist: {}",
                        bucket
                    )));
                }

                let key = format!("{}{}", prefix, job.file_name);
                let metadata = TransferMetadata::for_upload(job, &self.config.site_identifier);
                let outcome =
                    storage.upload_file(&bucket, &key, &job.source_path, &metadata)?;
                if !outcome.is_success() {
                    return Err(ArchiveError::TransferFailed(format!(
                        "upload of {} to s3://{}/{} returned status {}",
                        job.file_name, bucket, key, outcome.status_code
                    )));
                }
            }
            DestinationDescriptor::Local { directory } => {
                let sink = LocalDirSink::new(self.config.file_mask);
                let outcome = sink.copy_into(&job.source_path, &directory, &job.file_name)?;
                if let Some(warning) = outcome.chmod_warning {
                    warnings.push(warning);
                }
                if !outcome.written {
                    return Err(ArchiveError::TransferFailed(format!(
                        "copy of {} to {} failed",
                        job.file_name,
                        directory.display()
                    )));
                }
            }
            // resolve() only yields ContentStore for empty strings,
            // which were rejected above.
            DestinationDescriptor::ContentStore => {}
        }

        Ok(())
    }

    /// Stream an already-stored artifact to an object-storage bucket.
    ///
    /// Used by the CLI after a general backup was given an explicit
    /// `s3://` destination. The stored copy is kept either way.
    pub fn export_to_object_store(
        &self,
        job: &ArchiveJob,
        handle: &StoredArtifactHandle,
        bucket: &str,
        prefix: &str,
    ) -> Result<(), ArchiveError> {
        let storage = self.object_storage()?;
        if !storage.bucket_exists(bucket)? {
            return Err(ArchiveError::InvalidDestination(format!(
                "bucket does not exist: {}",
                bucket
            )));
        }

        let reader = self
            .content_store
            .open(&handle.address)
            .map_err(|e| ArchiveError::TransferFailed(format!("cannot read stored artifact: {}", e)))?;

        let key = format!("{}{}", prefix, handle.address.file_name);
        let metadata = TransferMetadata::for_export(job);
        let outcome = storage.upload_reader(bucket, &key, reader, &metadata)?;
        if !outcome.is_success() {
            return Err(ArchiveError::TransferFailed(format!(
                "upload of {} to s3://{}/{} returned status {}",
                handle.address.file_name, bucket, key, outcome.status_code
            )));
        }

        Ok(())
    }

    /// Copy an already-stored artifact into a local directory.
    ///
    /// On success the stored copy is deleted (the directory now holds the
    /// archive). A failed copy returns `Ok(false)` and keeps the stored
    /// copy as the fallback - deliberately softer than the object-storage
    /// export, which aborts instead.
    pub fn export_to_dir(
        &self,
        handle: &StoredArtifactHandle,
        directory: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<bool, ArchiveError> {
        destination::check_writable_dir(directory)?;

        let dest_path = directory.join(&handle.address.file_name);
        let mut reader = self
            .content_store
            .open(&handle.address)
            .map_err(|e| ArchiveError::TransferFailed(format!("cannot read stored artifact: {}", e)))?;

        let copied = File::create(&dest_path)
            .and_then(|mut dest| io::copy(&mut reader, &mut dest))
            .is_ok();
        if !copied {
            let _ = fs::remove_file(&dest_path);
            return Ok(false);
        }

        if let Err(e) = apply_mode(&dest_path, self.config.file_mask) {
            warnings.push(format!(
                "could not apply mode {:o} to {}: {}",
                self.config.file_mask,
                dest_path.display(),
                e
            ));
        }

        self.content_store.delete(&handle.address)?;
        Ok(true)
    }

    fn object_storage(&self) -> Result<&'a dyn ObjectStorage, ArchiveError> {
        self.object_storage.ok_or_else(|| {
            ArchiveError::InvalidDestination(
                "no object storage gateway configured".to_string(),
            )
        })
    }
}
