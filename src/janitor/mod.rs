//! Scratch-space janitor
//!
//! Backup jobs stage their working files under per-job directories below
//! a shared scratch root. The janitor owns that tree: it creates job
//! directories, empties and removes them, and sweeps out whole entries
//! that have outlived a cutoff.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::perm::apply_mode;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("could not create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a sweep removed from the scratch root.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub removed_dirs: usize,
    pub removed_files: usize,
}

/// Manages the per-job scratch directories under one root.
pub struct Janitor {
    scratch_root: PathBuf,
    dir_mask: u32,
}

impl Janitor {
    pub fn new(scratch_root: impl Into<PathBuf>, dir_mask: u32) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            dir_mask,
        }
    }

    /// Path of the scratch directory for one job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.scratch_root.join(job_id)
    }

    /// Create the scratch directory for a job, parents included.
    pub fn ensure_job_dir(&self, job_id: &str) -> Result<PathBuf, CleanupError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).map_err(|source| CleanupError::Create {
            path: dir.clone(),
            source,
        })?;
        if let Err(source) = apply_mode(&dir, self.dir_mask) {
            return Err(CleanupError::Create { path: dir, source });
        }
        Ok(dir)
    }

    /// Empty a directory without removing the directory itself.
    ///
    /// A missing directory is already empty. Directory permissions are
    /// loosened top-down before any entry is read, so a restrictive
    /// subtree gets repaired instead of aborting the clear; files get
    /// the mask before each unlink. The chmod is best-effort, the
    /// delete itself is strict and the first failure aborts the run.
    pub fn clear_contents(&self, dir: &Path) -> Result<(), CleanupError> {
        if !dir.exists() {
            return Ok(());
        }

        // Directories are yielded before their contents are listed, so
        // the mask lands before the walk descends into them.
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| CleanupError::Scan {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if entry.file_type().is_dir() {
                let _ = apply_mode(entry.path(), self.dir_mask);
            }
        }

        for entry in WalkDir::new(dir).contents_first(true) {
            let entry = entry.map_err(|e| CleanupError::Scan {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if entry.path() == dir {
                continue;
            }

            let path = entry.path();
            if entry.file_type().is_dir() {
                fs::remove_dir(path)
            } else {
                let _ = apply_mode(path, self.dir_mask);
                fs::remove_file(path)
            }
            .map_err(|source| CleanupError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
        }

        Ok(())
    }

    /// Remove a job directory and everything in it.
    pub fn delete_job_dir(&self, dir: &Path) -> Result<(), CleanupError> {
        if !dir.exists() {
            return Ok(());
        }
        self.clear_contents(dir)?;
        fs::remove_dir(dir).map_err(|source| CleanupError::Remove {
            path: dir.to_path_buf(),
            source,
        })
    }

    /// Remove every direct child of the scratch root last modified
    /// before `cutoff`.
    ///
    /// Only the root's own entries are examined; a directory's age is
    /// its own mtime, not that of its deepest file. A missing scratch
    /// root sweeps nothing.
    pub fn sweep_older_than(&self, cutoff: SystemTime) -> Result<SweepReport, CleanupError> {
        let mut report = SweepReport::default();
        if !self.scratch_root.exists() {
            return Ok(report);
        }

        let entries = fs::read_dir(&self.scratch_root).map_err(|source| CleanupError::Scan {
            path: self.scratch_root.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| CleanupError::Scan {
                path: self.scratch_root.clone(),
                source,
            })?;
            let path = entry.path();
            let scan_err = |source| CleanupError::Scan {
                path: path.clone(),
                source,
            };
            let metadata = entry.metadata().map_err(scan_err)?;
            if metadata.modified().map_err(scan_err)? >= cutoff {
                continue;
            }

            if metadata.is_dir() {
                self.delete_job_dir(&path)?;
                report.removed_dirs += 1;
            } else {
                fs::remove_file(&path).map_err(|source| CleanupError::Remove {
                    path: path.clone(),
                    source,
                })?;
                report.removed_files += 1;
            }
        }

        Ok(report)
    }
}
