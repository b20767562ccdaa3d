//! End-to-end archival pipeline tests
//!
//! Full job lifecycles through the public API: produce a file in a job
//! scratch directory, archive it, verify where it ended up and that the
//! scratch space can be reclaimed.

use std::fs;
use std::path::Path;

use backup_lane::archiver::{archive_address, ArchiveError};
use backup_lane::destination::{self, DestinationDescriptor};
use backup_lane::mock::MockObjectStorage;
use backup_lane::store::ContentStore;
use backup_lane::{
    ArchiveJob, Archiver, BackupMode, BackupType, Config, FsContentStore, Janitor, StoragePolicy,
};

struct Pipeline {
    config: Config,
    storage: MockObjectStorage,
    _root: tempfile::TempDir,
}

impl Pipeline {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            scratch_root: root.path().join("scratch"),
            content_store_root: root.path().join("store"),
            ..Config::default()
        };
        Self {
            config,
            storage: MockObjectStorage::with_bucket("site-backups"),
            _root: root,
        }
    }

    fn store(&self) -> FsContentStore {
        FsContentStore::new(&self.config.content_store_root).unwrap()
    }

    fn janitor(&self) -> Janitor {
        Janitor::new(&self.config.scratch_root, self.config.dir_mask)
    }

    /// Stage a produced archive in a fresh job scratch directory.
    fn produce(&self, job_id: &str, bytes: &[u8]) -> ArchiveJob {
        let dir = self.janitor().ensure_job_dir(job_id).unwrap();
        let source_path = dir.join("course-backup.mbz");
        fs::write(&source_path, bytes).unwrap();
        ArchiveJob {
            job_id: job_id.to_string(),
            source_path,
            file_name: "course-backup.mbz".to_string(),
            mode: BackupMode::General,
            kind: BackupType::Course,
            has_user_data: true,
            is_anonymised: false,
            owner_id: 5,
            container_id: 0,
            course_id: 101,
        }
    }
}

// =============================================================================
// Content-store lifecycle
// =============================================================================

#[test]
fn test_general_backup_lands_in_content_store() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let job = p.produce("job-a", b"course content");
    let outcome = archiver.store_backup_file(&job).unwrap();

    let handle = outcome.handle.expect("stored handle");
    assert_eq!(handle.size, 14);
    assert_eq!(handle.address.area, "course");
    assert!(store.exists(&handle.address));
    assert!(!job.source_path.exists(), "source must be consumed");
    assert!(outcome.warnings.is_empty());
}

#[test]
fn test_rearchiving_supersedes_previous_artifact() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let first = p.produce("job-a", b"version one");
    archiver.store_backup_file(&first).unwrap();

    // Same course, new run: the address is identical.
    let second = p.produce("job-b", b"version two, longer");
    let handle = archiver.store_backup_file(&second).unwrap().handle.unwrap();

    // Same address, new content.
    let mut reader = store.open(&handle.address).unwrap();
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut bytes).unwrap();
    assert_eq!(bytes, b"version two, longer");
}

#[test]
fn test_import_backup_is_left_alone() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-import", b"import staging");
    job.mode = BackupMode::Import;
    let outcome = archiver.store_backup_file(&job).unwrap();

    assert!(outcome.handle.is_none());
    assert!(job.source_path.exists(), "import keeps its working file");
    assert!(!store.exists(&archive_address(&job)));
}

// =============================================================================
// Automated backups with external storage
// =============================================================================

#[test]
fn test_automated_external_and_store_produces_both_copies() {
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalAndStore;
    p.config.external_destination = "s3://site-backups/weekly".to_string();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-auto", b"automated content");
    job.mode = BackupMode::Automated;
    let outcome = archiver.store_backup_file(&job).unwrap();

    let handle = outcome.handle.expect("stored handle");
    assert_eq!(handle.address.area, "automated");
    let object = p
        .storage
        .object("site-backups", "weekly/course-backup.mbz")
        .expect("uploaded object");
    assert_eq!(object.bytes, b"automated content");
    assert!(object.metadata.contains_key("backup-site"));
    assert!(!job.source_path.exists());
}

#[test]
fn test_automated_external_only_leaves_no_local_copy() {
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalOnly;
    p.config.external_destination = "s3://site-backups".to_string();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-auto", b"external only");
    job.mode = BackupMode::Automated;
    let outcome = archiver.store_backup_file(&job).unwrap();

    assert!(outcome.handle.is_none());
    assert!(p.storage.object("site-backups", "course-backup.mbz").is_some());
    assert!(!store.exists(&archive_address(&job)));
    assert!(!job.source_path.exists());
}

#[test]
fn test_missing_bucket_aborts_and_still_cleans_up() {
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalAndStore;
    p.config.external_destination = "s3://absent-bucket/weekly".to_string();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-auto", b"doomed");
    job.mode = BackupMode::Automated;
    let failure = archiver.store_backup_file(&job).unwrap_err();

    assert!(matches!(failure.error, ArchiveError::InvalidDestination(_)));
    assert_eq!(failure.exit_code(), 20);
    assert!(!store.exists(&archive_address(&job)));
    assert!(!job.source_path.exists(), "failure still consumes the source");
}

#[test]
fn test_rejected_upload_aborts_before_publishing() {
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalAndStore;
    p.config.external_destination = "s3://site-backups".to_string();
    p.storage.set_upload_status(403);
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-auto", b"rejected");
    job.mode = BackupMode::Automated;
    let failure = archiver.store_backup_file(&job).unwrap_err();

    assert!(matches!(failure.error, ArchiveError::TransferFailed(_)));
    assert_eq!(failure.exit_code(), 30);
    assert!(!store.exists(&archive_address(&job)));
}

#[test]
fn test_automated_to_local_directory() {
    let dest = tempfile::tempdir().unwrap();
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalAndStore;
    p.config.external_destination = dest.path().to_str().unwrap().to_string();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let mut job = p.produce("job-auto", b"to disk");
    job.mode = BackupMode::Automated;
    let outcome = archiver.store_backup_file(&job).unwrap();

    assert!(outcome.handle.is_some());
    assert_eq!(
        fs::read(dest.path().join("course-backup.mbz")).unwrap(),
        b"to disk"
    );
    assert_eq!(p.storage.object_count("site-backups"), 0);
}

#[test]
fn test_non_automated_modes_never_route_externally() {
    let mut p = Pipeline::new();
    p.config.storage_policy = StoragePolicy::ExternalOnly;
    p.config.external_destination = "s3://site-backups".to_string();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let job = p.produce("job-gen", b"general");
    let outcome = archiver.store_backup_file(&job).unwrap();

    assert!(outcome.handle.is_some(), "general backups go to the store");
    assert_eq!(p.storage.object_count("site-backups"), 0);
}

// =============================================================================
// Explicit export after archiving
// =============================================================================

#[test]
fn test_export_to_object_store_keeps_stored_copy() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let job = p.produce("job-a", b"exported");
    let handle = archiver.store_backup_file(&job).unwrap().handle.unwrap();

    match destination::resolve("s3://site-backups/exports/").unwrap() {
        DestinationDescriptor::ObjectStore { bucket, prefix } => {
            archiver
                .export_to_object_store(&job, &handle, &bucket, &prefix)
                .unwrap();
        }
        other => panic!("unexpected descriptor: {:?}", other),
    }

    let object = p
        .storage
        .object("site-backups", "exports/course-backup.mbz")
        .unwrap();
    assert_eq!(object.bytes, b"exported");
    assert_eq!(object.metadata.get("backup-course-id").unwrap(), "101");
    assert!(store.exists(&handle.address));
}

#[test]
fn test_export_to_directory_replaces_stored_copy() {
    let dest = tempfile::tempdir().unwrap();
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let job = p.produce("job-a", b"exported");
    let handle = archiver.store_backup_file(&job).unwrap().handle.unwrap();

    let mut warnings = Vec::new();
    let written = archiver
        .export_to_dir(&handle, dest.path(), &mut warnings)
        .unwrap();

    assert!(written);
    assert_eq!(
        fs::read(dest.path().join("course-backup.mbz")).unwrap(),
        b"exported"
    );
    assert!(!store.exists(&handle.address));
}

#[test]
fn test_export_to_missing_directory_is_invalid() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);

    let job = p.produce("job-a", b"exported");
    let handle = archiver.store_backup_file(&job).unwrap().handle.unwrap();

    let mut warnings = Vec::new();
    let err = archiver
        .export_to_dir(&handle, Path::new("/no/such/dir"), &mut warnings)
        .unwrap_err();

    assert!(matches!(err, ArchiveError::InvalidDestination(_)));
    // The stored copy is untouched by a failed export.
    assert!(store.exists(&handle.address));
}

// =============================================================================
// Scratch reclamation
// =============================================================================

#[test]
fn test_scratch_dir_can_be_reclaimed_after_archiving() {
    let p = Pipeline::new();
    let store = p.store();
    let archiver = Archiver::new(&p.config, Some(&p.storage), &store);
    let janitor = p.janitor();

    let job = p.produce("job-a", b"content");
    fs::write(janitor.job_dir("job-a").join("leftover.log"), b"log").unwrap();
    archiver.store_backup_file(&job).unwrap();

    janitor.delete_job_dir(&janitor.job_dir("job-a")).unwrap();
    assert!(!janitor.job_dir("job-a").exists());
    assert!(store.exists(&archive_address(&job)), "archive outlives scratch");
}
