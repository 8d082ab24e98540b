//! All-or-nothing file replacement.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Write `content` to `path` via a temp file in the same directory and a
/// rename, so readers see either the old file or the new one.
///
/// An existing file keeps its permissions. A new file gets the same mode
/// `fs::write` would give it (0666 less the umask), not the owner-only mode
/// temp files are created with.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir)?;

    tmp.write_all(content)?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
