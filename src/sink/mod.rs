//! Local directory sink
//!
//! Copies a finished archive into a writable directory, then applies the
//! configured permission mask. Destinations outside the managed data root
//! may refuse the chmod, so that failure is tolerated and reported as a
//! warning rather than an error.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::destination::{check_writable_dir, DestinationError};
use crate::perm::apply_mode;

/// Errors from the local directory sink.
///
/// Only precondition violations are errors here; a failed copy is an
/// outcome (`written: false`) so the caller can decide whether to keep a
/// fallback copy of the archive.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Destination(#[from] DestinationError),
}

/// Result of a copy attempt against a valid destination directory.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    /// Whether the byte copy succeeded.
    pub written: bool,

    /// Full path of the written file, when `written`.
    pub dest_path: Option<PathBuf>,

    /// Non-fatal chmod failure, reported upward as a warning.
    pub chmod_warning: Option<String>,
}

/// Copies archives into local destination directories.
#[derive(Debug, Clone, Copy)]
pub struct LocalDirSink {
    file_mask: u32,
}

impl LocalDirSink {
    /// Create a sink applying `file_mask` to every written file.
    pub fn new(file_mask: u32) -> Self {
        Self { file_mask }
    }

    /// Copy `source` to `dest_dir/file_name`.
    ///
    /// The destination must exist, be a directory and be writable, or the
    /// call fails before touching anything. A failed byte copy returns
    /// `written: false` rather than an error.
    pub fn copy_into(
        &self,
        source: &Path,
        dest_dir: &Path,
        file_name: &str,
    ) -> Result<CopyOutcome, SinkError> {
        check_writable_dir(dest_dir)?;

        let dest_path = dest_dir.join(file_name);
        if fs::copy(source, &dest_path).is_err() {
            return Ok(CopyOutcome {
                written: false,
                dest_path: None,
                chmod_warning: None,
            });
        }

        let chmod_warning = apply_mode(&dest_path, self.file_mask).err().map(|e| {
            format!(
                "could not apply mode {:o} to {}: {}",
                self.file_mask,
                dest_path.display(),
                e
            )
        });

        Ok(CopyOutcome {
            written: true,
            dest_path: Some(dest_path),
            chmod_warning,
        })
    }
}
