//! Run lock serializing fetch invocations.
//!
//! Overlapping invocations (for example two cron triggers while a slow run is
//! still downloading) coordinate through zero-byte marker files named
//! `<timestamp>.lock` in a shared base directory. A marker younger than the
//! configured timeout means another run is active. Older markers are stale,
//! left behind by a run that crashed, and are removed by the next run that
//! requests the lock.
//!
//! The lock is advisory. It only protects the cache from processes that request
//! it before touching the cache directory.
//!
//! A run that takes longer than the timeout loses its protection: a later
//! invocation treats its marker as stale, deletes it, and starts a second run
//! alongside. Callers must keep their run time below the timeout.
//!
//! ```no_run
//! use mail_attachment_cache::RunLock;
//!
//! # fn example() -> mail_attachment_cache::Result<()> {
//! let mut lock = RunLock::new("/var/lib/frame", RunLock::DEFAULT_TIMEOUT);
//! if !lock.request()? {
//!     // another run is active, skip this cycle
//!     return Ok(());
//! }
//! // ... fetch ...
//! lock.release()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::identity::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LOCK_EXTENSION: &str = "lock";

/// File-backed mutual exclusion with staleness recovery.
#[derive(Debug)]
pub struct RunLock {
    base_dir: PathBuf,
    timeout: Duration,
    marker: Option<PathBuf>,
}

impl RunLock {
    /// Default staleness timeout (30 minutes).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    /// Creates an unlocked handle for `base_dir` with a fixed staleness `timeout`.
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            timeout,
            marker: None,
        }
    }

    /// Returns the directory holding the lock markers.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the staleness timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` while this handle owns a marker.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.marker.is_some()
    }

    /// Requests the lock at the current time.
    ///
    /// See [`request_at`](Self::request_at).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] if the base directory cannot be read or a marker
    /// cannot be created or removed.
    pub fn request(&mut self) -> Result<bool> {
        self.request_at(Utc::now())
    }

    /// Requests the lock as of `now`.
    ///
    /// Removes every stale marker, then returns `Ok(false)` without creating a marker
    /// if a valid one remains. Otherwise creates a marker stamped `now` and returns
    /// `Ok(true)`. Calling this while already holding the lock returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] if the base directory cannot be read or a marker
    /// cannot be created or removed.
    #[instrument(
        name = "RunLock::request",
        skip(self),
        fields(lock_dir = %self.base_dir.display())
    )]
    pub fn request_at(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.marker.is_some() {
            return Ok(true);
        }

        let mut valid_lock_active = false;
        for (path, stamp) in self.markers()? {
            let age = now.signed_duration_since(stamp);
            let still_valid = age
                .to_std()
                .map_or(true, |age| age < self.timeout);

            if still_valid {
                info!(marker = %path.display(), "Found valid lock");
                valid_lock_active = true;
            } else {
                warn!(
                    marker = %path.display(),
                    age_secs = age.num_seconds(),
                    "Found stale lock, removing it"
                );
                remove_marker(&path)?;
            }
        }

        if valid_lock_active {
            return Ok(false);
        }

        let marker = self
            .base_dir
            .join(format!("{}.{LOCK_EXTENSION}", format_timestamp(&now)));

        if create_marker(&marker)? {
            debug!(marker = %marker.display(), "Lock acquired");
            self.marker = Some(marker);
            Ok(true)
        } else {
            info!(marker = %marker.display(), "Lock created concurrently by another run");
            Ok(false)
        }
    }

    /// Deletes the marker created by this handle, if any.
    ///
    /// Idempotent: calling it twice, or without a prior successful
    /// [`request`](Self::request), does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] if the marker exists but cannot be removed.
    #[instrument(
        name = "RunLock::release",
        skip(self),
        fields(lock_dir = %self.base_dir.display())
    )]
    pub fn release(&mut self) -> Result<()> {
        if let Some(marker) = self.marker.take() {
            remove_marker(&marker)?;
            debug!(marker = %marker.display(), "Lock released");
        }
        Ok(())
    }

    /// Lists lock markers with their parsed timestamps.
    ///
    /// Markers whose name is not a timestamp are logged and skipped.
    fn markers(&self) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
        let lock_err = |source| Error::Lock {
            path: self.base_dir.clone(),
            source,
        };

        let mut markers = Vec::new();
        for entry in fs::read_dir(&self.base_dir).map_err(lock_err)? {
            let entry = entry.map_err(lock_err)?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some(LOCK_EXTENSION) {
                continue;
            }
            if !entry.file_type().map_err(lock_err)?.is_file() {
                continue;
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            match parse_timestamp(stem) {
                Some(stamp) => markers.push((path, stamp)),
                None => warn!(marker = %path.display(), "Ignoring lock file with unreadable timestamp"),
            }
        }

        Ok(markers)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to release run lock on drop");
        }
    }
}

/// Creates `path` exclusively. Returns `Ok(false)` if it already exists.
fn create_marker(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(Error::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Another run reclaimed it first
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}
