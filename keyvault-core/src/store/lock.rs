//! Cross-process lock for the record directory.
//!
//! On Unix a `flock` advisory lock on `<root>/keyvault/lock` serializes
//! record writers across processes. Elsewhere the lock is a no-op and
//! in-process serialization is left to the vault's account locks.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use super::{StoreError, StoreResult};

/// A file-backed lock that serializes store mutations across processes.
#[derive(Debug, Clone)]
pub struct DirectoryLock {
    file: Arc<File>,
}

/// Guard that holds the exclusive lock for its lifetime.
#[derive(Debug)]
pub struct DirectoryLockGuard {
    file: Arc<File>,
}

impl DirectoryLock {
    /// Opens or creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| map_io_err(&err))?;
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Acquires the exclusive lock, blocking until it is free.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired.
    pub fn lock(&self) -> StoreResult<DirectoryLockGuard> {
        imp::lock_exclusive(&self.file).map_err(|err| map_io_err(&err))?;
        Ok(DirectoryLockGuard {
            file: Arc::clone(&self.file),
        })
    }
}

impl Drop for DirectoryLockGuard {
    fn drop(&mut self) {
        let _ = imp::unlock(&self.file);
    }
}

fn map_io_err(err: &std::io::Error) -> StoreError {
    StoreError::Lock(err.to_string())
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;

    const LOCK_EX: c_int = 2;
    const LOCK_UN: c_int = 8;

    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    fn call(file: &File, operation: c_int) -> std::io::Result<()> {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let result = unsafe { flock(file.as_raw_fd(), operation) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    pub fn lock_exclusive(file: &File) -> std::io::Result<()> {
        call(file, LOCK_EX)
    }

    pub fn unlock(file: &File) -> std::io::Result<()> {
        call(file, LOCK_UN)
    }
}

#[cfg(not(unix))]
mod imp {
    use std::fs::File;

    #[allow(clippy::unnecessary_wraps)]
    pub fn lock_exclusive(_file: &File) -> std::io::Result<()> {
        Ok(())
    }

    #[allow(clippy::unnecessary_wraps)]
    pub fn unlock(_file: &File) -> std::io::Result<()> {
        Ok(())
    }
}
