//! Per-domain mutual exclusion
//!
//! At most one run per domain is in flight at any time. A [`DomainLease`] is
//! taken when a run is triggered and travels with the run until it finishes;
//! dropping the lease releases the domain, on success, failure or panic alike.
//!
//! The lock table is a plain `std::sync::Mutex`: it is only touched for a
//! set lookup and is never held across an `.await`.
//!
//! With a lock directory, a lease also holds an exclusive advisory lock on
//! `<dir>/<domain>.lock`, so a one-shot CLI run and the daemon never run the
//! same domain concurrently. The OS drops the file lock when the process
//! exits, so a crashed holder never leaves a stale lock behind.

use std::collections::HashSet;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Table of domains with a run in flight
#[derive(Debug, Clone, Default)]
pub struct DomainLocks {
    held: Arc<Mutex<HashSet<String>>>,
    dir: Option<PathBuf>,
}

impl DomainLocks {
    /// Locks that only exclude runs within this process
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks shared with every process using the same `dir`
    ///
    /// # Errors
    ///
    /// `Error::Config` when the directory cannot be created.
    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Result<Self, crate::Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            crate::Error::config(format!(
                "Failed to create lock directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            held: Arc::default(),
            dir: Some(dir),
        })
    }

    pub fn lock_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Take the lock for `domain`, or `None` if a run (here or in another
    /// process sharing the lock directory) already holds it
    pub fn try_acquire(&self, domain: &str) -> Option<DomainLease> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(domain.to_string()) {
            return None;
        }

        let file = match &self.dir {
            Some(dir) => match lock_file(dir, domain) {
                Ok(file) => Some(file),
                Err(e) => {
                    held.remove(domain);
                    if let TryLockError::Error(e) = e {
                        tracing::warn!(domain = %domain, error = %e, "Failed to take domain lock file");
                    }
                    return None;
                }
            },
            None => None,
        };

        Some(DomainLease {
            domain: domain.to_string(),
            held: Arc::clone(&self.held),
            file,
        })
    }

    /// Whether a run in this process holds `domain`
    pub fn is_locked(&self, domain: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(domain)
    }

    /// Number of domains currently locked by this process
    pub fn held(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn lock_file(dir: &Path, domain: &str) -> Result<File, TryLockError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(dir.join(format!("{domain}.lock")))
        .map_err(TryLockError::Error)?;
    file.try_lock()?;
    Ok(file)
}

/// Proof that the holder owns a domain's run slot
#[derive(Debug)]
pub struct DomainLease {
    domain: String,
    held: Arc<Mutex<HashSet<String>>>,
    file: Option<File>,
}

impl DomainLease {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Drop for DomainLease {
    fn drop(&mut self) {
        // Closing the file releases the cross-process lock before the slot reopens
        drop(self.file.take());
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.domain);
    }
}
