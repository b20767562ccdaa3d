//! Destination resolution
//!
//! Classifies a configured destination string into a normalized
//! [`DestinationDescriptor`] before any transfer work starts. The string
//! is parsed once and call sites dispatch on the tagged variant instead
//! of re-inspecting the URL prefix.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URL scheme marker for object-storage destinations.
pub const OBJECT_URL_SCHEME: &str = "s3://";

/// Errors during destination resolution.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// Object-storage URL with no bucket segment (`s3://`).
    #[error("object storage URL has no bucket: {0}")]
    EmptyBucket(String),

    /// Local path does not exist or is not a directory.
    #[error("destination is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Local directory exists but cannot be written to.
    #[error("destination directory is not writable: {0}")]
    NotWritable(PathBuf),
}

/// Normalized archive destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DestinationDescriptor {
    /// Writable local filesystem directory.
    Local { directory: PathBuf },
    /// Object-storage bucket plus key prefix. The prefix is either empty
    /// or ends with exactly one `/`.
    ObjectStore { bucket: String, prefix: String },
    /// The internal content-addressed store.
    ContentStore,
}

/// Check whether a destination string uses the object-storage URL scheme.
///
/// The scheme match is case-insensitive.
pub fn is_object_url(destination: &str) -> bool {
    destination.len() >= OBJECT_URL_SCHEME.len()
        && destination[..OBJECT_URL_SCHEME.len()].eq_ignore_ascii_case(OBJECT_URL_SCHEME)
}

/// Parse an `s3://bucket[/prefix...]` URL into (bucket, prefix).
///
/// The bucket is the path segment up to the first `/` after the scheme.
/// The prefix is everything after it, with any trailing slashes stripped
/// and a single `/` re-appended when non-empty.
pub fn parse_object_url(url: &str) -> Result<(String, String), DestinationError> {
    debug_assert!(is_object_url(url));
    let rest = &url[OBJECT_URL_SCHEME.len()..];

    let (bucket, remainder) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(DestinationError::EmptyBucket(url.to_string()));
    }

    let mut prefix = remainder.trim_end_matches('/').to_string();
    if !prefix.is_empty() {
        prefix.push('/');
    }

    Ok((bucket.to_string(), prefix))
}

/// Resolve a destination string into a [`DestinationDescriptor`].
///
/// An empty string resolves to the content store. Deterministic for
/// identical inputs; the only I/O is the existence/writability probe on
/// local paths.
pub fn resolve(destination: &str) -> Result<DestinationDescriptor, DestinationError> {
    if destination.is_empty() {
        return Ok(DestinationDescriptor::ContentStore);
    }

    if is_object_url(destination) {
        let (bucket, prefix) = parse_object_url(destination)?;
        return Ok(DestinationDescriptor::ObjectStore { bucket, prefix });
    }

    let path = Path::new(destination);
    check_writable_dir(path)?;
    Ok(DestinationDescriptor::Local {
        directory: path.to_path_buf(),
    })
}

/// Verify a local destination exists, is a directory and is writable.
pub fn check_writable_dir(path: &Path) -> Result<(), DestinationError> {
    if !path.is_dir() {
        return Err(DestinationError::NotADirectory(path.to_path_buf()));
    }

    // Probe writability by creating and removing a marker file.
    let probe = path.join(".backup_lane_probe");
    match File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(_) => Err(DestinationError::NotWritable(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_and_prefix() {
        let (bucket, prefix) = parse_object_url("s3://bucket/foo/bar").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(prefix, "foo/bar/");
    }

    #[test]
    fn test_parse_bucket_only() {
        let (bucket, prefix) = parse_object_url("s3://bucket").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(prefix, "");

        // A bare trailing slash yields an empty prefix too.
        let (bucket, prefix) = parse_object_url("s3://bucket/").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(prefix, "");
    }

    #[test]
    fn test_parse_trailing_slashes_collapse() {
        let (_, prefix) = parse_object_url("s3://bucket/a/b///").unwrap();
        assert_eq!(prefix, "a/b/");
    }

    #[test]
    fn test_parse_empty_bucket() {
        assert!(matches!(
            parse_object_url("s3://"),
            Err(DestinationError::EmptyBucket(_))
        ));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(is_object_url("S3://bucket"));
        assert!(is_object_url("s3://bucket"));
        assert!(!is_object_url("gs://bucket"));
        assert!(!is_object_url("/var/backups"));

        let resolved = resolve("S3://Bucket/Pre").unwrap();
        assert_eq!(
            resolved,
            DestinationDescriptor::ObjectStore {
                bucket: "Bucket".to_string(),
                prefix: "Pre/".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_resolves_to_content_store() {
        assert_eq!(resolve("").unwrap(), DestinationDescriptor::ContentStore);
    }

    #[test]
    fn test_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            resolved,
            DestinationDescriptor::Local {
                directory: dir.path().to_path_buf(),
            }
        );
    }

    #[test]
    fn test_local_missing_directory() {
        let result = resolve("/nonexistent/backup-destination");
        assert!(matches!(result, Err(DestinationError::NotADirectory(_))));
    }

    #[test]
    fn test_local_path_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = resolve(file.path().to_str().unwrap());
        assert!(matches!(result, Err(DestinationError::NotADirectory(_))));
    }
}
