//! Per-output advisory locks.
//!
//! Each output `foo.css` is guarded by a sidecar `foo.css.lock` locked with
//! `flock`-style exclusive locks. Locking never blocks: a held lock is
//! reported as [`LockAttempt::HeldByOther`]. The sidecar is never deleted,
//! so every process always locks the same inode.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Result, SheetError};

/// Result of a non-blocking lock attempt.
#[derive(Debug)]
pub enum LockAttempt {
    Acquired(OutputLock),
    HeldByOther,
}

/// An exclusive lock on one output path, released on drop.
#[derive(Debug)]
pub struct OutputLock {
    file: File,
    lock_path: PathBuf,
}

/// Sidecar lock file for an output.
pub fn lock_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl OutputLock {
    /// Try to lock `output` without waiting.
    ///
    /// Contention is not an error; failing to open or lock the sidecar is
    /// [`SheetError::Lock`].
    pub fn try_acquire(output: &Path) -> Result<LockAttempt> {
        let lock_path = lock_path_for(output);
        debug!(?lock_path, "Acquiring output lock");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(SheetError::Lock)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(LockAttempt::Acquired(OutputLock { file, lock_path })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                debug!(?lock_path, "Output lock held by another writer");
                Ok(LockAttempt::HeldByOther)
            }
            // fs2 reports contention on some platforms with the raw lock error
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Ok(LockAttempt::HeldByOther)
            }
            Err(e) => Err(SheetError::Lock(e)),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(lock_path = ?self.lock_path, error = %e, "Failed to release output lock");
        }
    }
}
