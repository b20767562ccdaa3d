//! backup-lane: archival pipeline for produced course backups.
//!
//! A finished backup archive enters the pipeline as a temp file plus job
//! metadata and leaves as exactly one durable copy: in the local content
//! store, in a local directory, or in an object-storage bucket. The
//! source temp file never survives, success or failure.

pub mod archiver;
pub mod config;
pub mod destination;
pub mod janitor;
pub mod job;
pub mod mock;
pub mod sink;
pub mod storage;
pub mod store;

mod perm;

pub use archiver::{ArchiveError, ArchiveFailure, ArchiveOutcome, Archiver};
pub use config::{Config, StoragePolicy};
pub use destination::DestinationDescriptor;
pub use janitor::Janitor;
pub use job::{ArchiveJob, BackupMode, BackupType};
pub use store::{ContentStore, FsContentStore, StoredArtifactHandle};
