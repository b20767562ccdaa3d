//! Pipeline configuration
//!
//! Everything the pipeline needs is an explicit [`Config`] value handed to
//! the orchestrator constructor; there is no ambient process-wide state.
//! Loadable from a TOML file, with built-in defaults for every field.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Whether automated backups go to external storage, and whether the
/// content store keeps a copy on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoragePolicy {
    /// Archives live in the content store only.
    #[default]
    ContentStore,
    /// The external destination holds the only copy.
    ExternalOnly,
    /// Copy externally first, then publish into the content store as well.
    ExternalAndStore,
}

impl StoragePolicy {
    /// Map the legacy numeric setting: 0 = content store, 1 = external
    /// only, any other nonzero value = external and store.
    pub fn from_flag(flag: i64) -> Self {
        match flag {
            0 => StoragePolicy::ContentStore,
            1 => StoragePolicy::ExternalOnly,
            _ => StoragePolicy::ExternalAndStore,
        }
    }

    /// Whether this policy routes automated backups externally at all.
    pub fn uses_external(&self) -> bool {
        !matches!(self, StoragePolicy::ContentStore)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Routing policy for automated backups.
    pub storage_policy: StoragePolicy,

    /// External destination for automated backups: an `s3://bucket[/prefix]`
    /// URL or a local directory path. Empty when unset.
    pub external_destination: String,

    /// Permission mask applied to files copied to local destinations
    /// (octal, e.g. `0o640`).
    pub file_mask: u32,

    /// Permission mask applied before deletes in the scratch tree
    /// (octal, e.g. `0o770`).
    pub dir_mask: u32,

    /// Root of the per-job scratch directories.
    pub scratch_root: PathBuf,

    /// Root of the filesystem content store.
    pub content_store_root: PathBuf,

    /// Identifier of this site, recorded (digested) in upload metadata.
    pub site_identifier: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            storage_policy: StoragePolicy::ContentStore,
            external_destination: String::new(),
            file_mask: 0o640,
            dir_mask: 0o770,
            scratch_root: std::env::temp_dir().join("backup-lane"),
            content_store_root: PathBuf::from(format!("{}/.local/share/backup-lane/store", home)),
            site_identifier: "backup-lane".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(StoragePolicy::from_flag(0), StoragePolicy::ContentStore);
        assert_eq!(StoragePolicy::from_flag(1), StoragePolicy::ExternalOnly);
        assert_eq!(StoragePolicy::from_flag(2), StoragePolicy::ExternalAndStore);
        assert_eq!(StoragePolicy::from_flag(-3), StoragePolicy::ExternalAndStore);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage_policy, StoragePolicy::ContentStore);
        assert!(config.external_destination.is_empty());
        assert_eq!(config.file_mask, 0o640);
        assert!(!config.storage_policy.uses_external());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "storage_policy = \"external-and-store\"\n\
             external_destination = \"s3://backups/nightly\"\n\
             file_mask = 0o600"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage_policy, StoragePolicy::ExternalAndStore);
        assert_eq!(config.external_destination, "s3://backups/nightly");
        assert_eq!(config.file_mask, 0o600);
        // Unset keys fall back to defaults.
        assert_eq!(config.dir_mask, 0o770);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/backup-lane.toml"));
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
