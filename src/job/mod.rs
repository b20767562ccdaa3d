//! Archive job model
//!
//! An [`ArchiveJob`] describes one finished backup archive sitting in a
//! per-job scratch directory, together with the metadata the orchestrator
//! needs to decide where the file must end up. The producer guarantees
//! `source_path` is a complete, closed, readable file before handing the
//! job over; the orchestrator consumes the job exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How the backup was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Interactive or ad-hoc backup.
    General,
    /// Backup produced as the first half of an import; never archived.
    Import,
    /// Backup destined for upload to a community hub.
    Hub,
    /// Scheduled backup; the only mode that may route to external storage.
    Automated,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupMode::General => "general",
            BackupMode::Import => "import",
            BackupMode::Hub => "hub",
            BackupMode::Automated => "automated",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BackupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(BackupMode::General),
            "import" => Ok(BackupMode::Import),
            "hub" => Ok(BackupMode::Hub),
            "automated" => Ok(BackupMode::Automated),
            other => Err(format!("unknown backup mode: {}", other)),
        }
    }
}

/// What the backup covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// A single activity module.
    Activity,
    /// A single course section.
    Section,
    /// A whole course.
    Course,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupType::Activity => "activity",
            BackupType::Section => "section",
            BackupType::Course => "course",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BackupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "activity" => Ok(BackupType::Activity),
            "section" => Ok(BackupType::Section),
            "course" => Ok(BackupType::Course),
            other => Err(format!("unknown backup type: {}", other)),
        }
    }
}

/// One unit of archival work: a produced backup file plus routing metadata.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// Opaque job identifier (also names the scratch directory).
    pub job_id: String,

    /// Path to the produced archive file in the scratch directory.
    pub source_path: PathBuf,

    /// Logical file name the archive is stored under.
    pub file_name: String,

    /// How the backup was initiated.
    pub mode: BackupMode,

    /// What the backup covers.
    pub kind: BackupType,

    /// Whether the archive contains user data.
    pub has_user_data: bool,

    /// Whether user data was anonymised during production.
    pub is_anonymised: bool,

    /// Id of the user who initiated the backup.
    pub owner_id: i64,

    /// Id of the activity/section the backup covers (type-dependent).
    pub container_id: i64,

    /// Id of the course the backup belongs to.
    pub course_id: i64,
}

/// Descriptive key/value metadata attached to an object-store upload.
///
/// Purely informational: nothing in this pipeline reads it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferMetadata(BTreeMap<String, String>);

impl TransferMetadata {
    /// Build the full metadata map for an orchestrated upload.
    ///
    /// `site_identifier` is recorded as a SHA-256 digest so bucket listings
    /// never leak the raw site name.
    pub fn for_upload(job: &ArchiveJob, site_identifier: &str) -> Self {
        let mut meta = Self::for_export(job);
        let mut hasher = Sha256::new();
        hasher.update(site_identifier.as_bytes());
        meta.0
            .insert("backup-site".to_string(), hex::encode(hasher.finalize()));
        meta.0.insert(
            "backup-date".to_string(),
            Utc::now().timestamp().to_string(),
        );
        meta
    }

    /// Build the reduced metadata map used by the CLI export path.
    pub fn for_export(job: &ArchiveJob) -> Self {
        let mut map = BTreeMap::new();
        map.insert("backup-course-id".to_string(), job.course_id.to_string());
        map.insert("backup-id".to_string(), job.job_id.clone());
        map.insert("backup-type".to_string(), job.kind.to_string());
        map.insert("backup-mode".to_string(), job.mode.to_string());
        TransferMetadata(map)
    }

    /// Iterate over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look up one entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
