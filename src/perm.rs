//! Permission mask helper shared by the sink and the janitor.

use std::io;
use std::path::Path;

/// Apply an octal permission mode to a path.
///
/// No-op on non-Unix targets, where mode bits have no meaning.
#[cfg(unix)]
pub(crate) fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
