//! Filesystem-backed content store.
//!
//! Artifacts live under a two-level fan-out keyed by the address hash:
//! `<root>/<hash[0:2]>/<hash>/content`, with a `record.json` sidecar
//! holding the serialized handle. Ingestion writes to a temp file and
//! renames into place so readers never observe a partial artifact.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::{ContentStore, FileAddress, StoreError, StoredArtifactHandle};

const RECORD_FILE: &str = "record.json";
const CONTENT_FILE: &str = "content";

/// Content store rooted at a local directory.
#[derive(Debug)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        // Fail fast if the root is not writable.
        let probe = root.join(".store_probe");
        File::create(&probe)?;
        fs::remove_file(&probe)?;

        Ok(Self { root })
    }

    fn artifact_dir(&self, address: &FileAddress) -> PathBuf {
        let hash = address.address_hash();
        self.root.join(&hash[..2]).join(hash)
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }

    /// Copy `source` into `dest` while hashing, returning (sha256, size).
    fn copy_and_hash(source: &Path, dest: &Path) -> io::Result<(String, u64)> {
        let mut reader = File::open(source)?;
        let mut writer = File::create(dest)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        let mut total = 0u64;

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            writer.write_all(&buffer[..n])?;
            total += n as u64;
        }
        writer.flush()?;

        Ok((hex::encode(hasher.finalize()), total))
    }
}

impl ContentStore for FsContentStore {
    fn exists(&self, address: &FileAddress) -> bool {
        self.artifact_dir(address).join(CONTENT_FILE).exists()
    }

    fn get(&self, address: &FileAddress) -> Option<StoredArtifactHandle> {
        let record_path = self.artifact_dir(address).join(RECORD_FILE);
        let contents = fs::read_to_string(record_path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn delete(&self, address: &FileAddress) -> Result<(), StoreError> {
        let dir = self.artifact_dir(address);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            // Drop the fan-out directory too if this was its last entry.
            if let Some(parent) = dir.parent() {
                let _ = fs::remove_dir(parent);
            }
        }
        Ok(())
    }

    fn create_from_path(
        &self,
        address: &FileAddress,
        source: &Path,
        owner_id: i64,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<StoredArtifactHandle, StoreError> {
        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir)?;

        let temp_path = temp_dir.join(format!(
            ".ingest.{}.{}",
            std::process::id(),
            address.address_hash()
        ));

        let (content_sha256, size) = match Self::copy_and_hash(source, &temp_path) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(StoreError::Io(e));
            }
        };

        let dir = self.artifact_dir(address);
        if let Err(e) = fs::create_dir_all(&dir) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        if let Err(e) = fs::rename(&temp_path, dir.join(CONTENT_FILE)) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        let handle = StoredArtifactHandle {
            address: address.clone(),
            content_sha256,
            size,
            owner_id,
            created_at,
            modified_at,
        };

        let record = serde_json::to_string_pretty(&handle).map_err(|e| StoreError::Corrupt {
            path: dir.join(RECORD_FILE),
            reason: e.to_string(),
        })?;
        fs::write(dir.join(RECORD_FILE), record)?;

        Ok(handle)
    }

    fn open(&self, address: &FileAddress) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = self.artifact_dir(address).join(CONTENT_FILE);
        if !path.exists() {
            return Err(StoreError::NotFound(address.address_hash()));
        }
        Ok(Box::new(File::open(path)?))
    }
}
