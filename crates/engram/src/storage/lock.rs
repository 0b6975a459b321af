//! Advisory file locking for cross-process write serialization
//!
//! Writers from separate processes (CLI, daemon, hook scripts) coordinate
//! through lock files created with `O_EXCL`. Readers never take locks;
//! they rely on atomic renames for consistency.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngramError, Result};

/// Lock acquisition parameters, derived from `StorageConfig`.
#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// Total create attempts before giving up
    pub attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub base_delay: Duration,
    /// Age at which an existing lock file is considered abandoned
    pub stale_after: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(50),
            stale_after: Duration::from_secs(60),
        }
    }
}

/// An exclusive advisory lock held for the lifetime of the guard.
///
/// The lock file records the holder's PID for diagnostics. Dropping the
/// guard removes the file; a file left behind by a crashed process is
/// broken once it exceeds the staleness horizon.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, retrying with exponential backoff.
    ///
    /// Signals `LockTimeout` after the configured attempts are exhausted;
    /// never blocks indefinitely.
    pub fn acquire(path: &Path, settings: LockSettings) -> Result<Self> {
        for attempt in 0..settings.attempts {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path, settings.stale_after) {
                        tracing::warn!("Breaking stale lock file: {}", path.display());
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    if attempt + 1 < settings.attempts {
                        let delay = settings.base_delay * 2u32.saturating_pow(attempt);
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngramError::LockTimeout(path.display().to_string()))
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        // Already gone; the next create attempt decides.
        return false;
    };
    match metadata.modified().ok().and_then(|m| m.elapsed().ok()) {
        Some(age) => age > stale_after,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings() -> LockSettings {
        LockSettings {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            stale_after: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.lock");

        {
            let lock = FileLock::acquire(&path, fast_settings()).unwrap();
            assert!(lock.path().exists());
        }

        assert!(!path.exists(), "lock file removed on drop");
    }

    #[test]
    fn test_contention_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.lock");

        let _held = FileLock::acquire(&path, fast_settings()).unwrap();
        let second = FileLock::acquire(&path, fast_settings());

        match second {
            Err(EngramError::LockTimeout(_)) => {}
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.lock");

        drop(FileLock::acquire(&path, fast_settings()).unwrap());
        let second = FileLock::acquire(&path, fast_settings());
        assert!(second.is_ok());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.lock");

        // Simulate a lock file left behind by a crashed process.
        std::fs::write(&path, "99999").unwrap();

        let settings = LockSettings {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            stale_after: Duration::from_millis(0),
        };
        std::thread::sleep(Duration::from_millis(5));

        let lock = FileLock::acquire(&path, settings);
        assert!(lock.is_ok(), "stale lock should be broken and reacquired");
    }
}
