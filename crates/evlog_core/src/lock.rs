//! Cross-process mutual exclusion for the log directory.
//!
//! Every process sharing a log directory coordinates through an OS
//! advisory lock on `events.lock`. Mutations take the lock exclusively;
//! read-only operations take it shared, so they never observe a
//! half-applied rotation but do not exclude each other.
//!
//! The operating system drops the lock when the holder exits, crashed or
//! not, so there is no stale-lock reclamation. The lock file itself is
//! never deleted: removing a locked file would let two processes lock two
//! different inodes under the same name.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How a lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders, no exclusive holder.
    Shared,
    /// A single holder.
    Exclusive,
}

/// Bounded-retry advisory lock on a single file.
///
/// Each acquisition opens its own file handle, so threads of one process
/// contend with each other exactly like separate processes do.
#[derive(Debug, Clone)]
pub struct ProcessMutex {
    path: PathBuf,
    attempts: u32,
    interval: Duration,
}

impl ProcessMutex {
    /// Creates a mutex over the lock file at `path`.
    ///
    /// At least one attempt is always made.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, attempts: u32, interval: Duration) -> Self {
        Self {
            path: path.into(),
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the lock, polling with a fixed backoff.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock is still held by someone else
    /// after the configured number of attempts, or an I/O error if the
    /// lock file cannot be opened.
    pub fn acquire(&self, mode: LockMode) -> CoreResult<LockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        for attempt in 1..=self.attempts {
            let result = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match result {
                Ok(()) => {
                    let guard = LockGuard {
                        file: Some(file),
                        mode,
                    };
                    if mode == LockMode::Exclusive {
                        guard.record_holder()?;
                    }
                    if attempt > 1 {
                        debug!(path = %self.path.display(), attempt, "lock acquired after contention");
                    }
                    return Ok(guard);
                }
                Err(e) if is_contended(&e) => {
                    if attempt < self.attempts {
                        thread::sleep(self.interval);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            path = %self.path.display(),
            attempts = self.attempts,
            holder = ?self.holder_pid().ok().flatten(),
            "giving up on log lock"
        );
        Err(CoreError::LockTimeout {
            path: self.path.clone(),
            attempts: self.attempts,
        })
    }

    /// Runs `f` while holding the lock in `mode`.
    ///
    /// The lock is released on every return path.
    pub fn with_lock<T>(&self, mode: LockMode, f: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        let _guard = self.acquire(mode)?;
        f()
    }

    /// Returns the process id recorded by the last exclusive holder.
    ///
    /// The id is diagnostic only; the lock itself is what matters.
    pub fn holder_pid(&self) -> CoreResult<Option<u32>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// A held lock. Dropping the guard releases it.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    mode: LockMode,
}

impl LockGuard {
    /// Returns the mode the lock is held in.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Returns true while the lock is held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Releases the lock. Calling this more than once is a no-op.
    pub fn release(&mut self) -> CoreResult<()> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)?;
        }
        Ok(())
    }

    fn record_holder(&self) -> CoreResult<()> {
        if let Some(mut file) = self.file.as_ref() {
            file.set_len(0)?;
            writeln!(file, "{}", std::process::id())?;
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Closing the handle releases the lock even if unlock fails.
        let _ = self.release();
    }
}
