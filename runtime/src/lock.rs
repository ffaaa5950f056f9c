// Copyright 2026 Pitchfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-local singleton guard.
//!
//! The lock file records the owning pid and its creation time. A lock whose
//! pid no longer answers `kill -0` is stale and is replaced. Creation goes
//! through a temp file and `hard_link`, which fails if the target exists, so
//! two starters never both believe they created a fresh lock.
//!
//! Replacing a stale lock is serialized the same way: a contender must first
//! create `<lock>.takeover`, then re-check that the lock still holds the
//! stale bytes it saw before renaming its own record over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bounds the create/take-over loop when starters keep racing.
const MAX_INSTALL_ROUNDS: u32 = 8;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another instance is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("lock file {} kept changing while acquiring it", .path.display())]
    Contended { path: PathBuf },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            created_at: Utc::now(),
        }
    }
}

/// Read the lock file, if any. Understands both the JSON record and a bare
/// pid (whose creation time is taken from the file's mtime).
pub fn read_record(path: &Path) -> Option<LockRecord> {
    let raw = std::fs::read(path).ok()?;
    parse_record(&raw, path)
}

fn parse_record(raw: &[u8], path: &Path) -> Option<LockRecord> {
    if let Ok(record) = serde_json::from_slice::<LockRecord>(raw) {
        return Some(record);
    }
    let pid: u32 = std::str::from_utf8(raw).ok()?.trim().parse().ok()?;
    let created_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Some(LockRecord { pid, created_at })
}

/// Whether `pid` names a running process.
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    #[cfg(unix)]
    {
        let output = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output();
        matches!(output, Ok(o) if o.status.success())
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Proof of exclusive ownership. Releases the lock on drop.
#[derive(Debug)]
pub struct SingletonGuard {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl SingletonGuard {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        Self::acquire_with(path, pid_alive)
    }

    /// Like [`acquire`](Self::acquire) with a custom liveness probe.
    pub fn acquire_with<F>(path: &Path, is_alive: F) -> Result<Self, LockError>
    where
        F: Fn(u32) -> bool,
    {
        Self::acquire_as(path, LockRecord::current(), is_alive)
    }

    fn acquire_as<F>(path: &Path, record: LockRecord, is_alive: F) -> Result<Self, LockError>
    where
        F: Fn(u32) -> bool,
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
        }

        let tmp = sibling(path, &format!("{}.tmp", record.pid));
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| LockError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        std::fs::write(&tmp, bytes).map_err(|e| LockError::io(&tmp, e))?;

        let result = Self::install(path, &tmp, record.pid, &is_alive);
        let _ = std::fs::remove_file(&tmp);
        result?;

        info!(pid = record.pid, path = %path.display(), "lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            pid: record.pid,
            released: false,
        })
    }

    fn install<F>(path: &Path, tmp: &Path, own_pid: u32, is_alive: &F) -> Result<(), LockError>
    where
        F: Fn(u32) -> bool,
    {
        for _ in 0..MAX_INSTALL_ROUNDS {
            match std::fs::hard_link(tmp, path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LockError::io(path, e)),
            }

            let observed = match std::fs::read(path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LockError::io(path, e)),
            };
            match parse_record(&observed, path) {
                Some(existing) if existing.pid != own_pid && is_alive(existing.pid) => {
                    return Err(LockError::AlreadyRunning { pid: existing.pid });
                }
                Some(existing) => {
                    warn!(stale_pid = existing.pid, created_at = %existing.created_at, "replacing stale lock");
                }
                None => warn!(path = %path.display(), "replacing unreadable lock file"),
            }

            if Self::take_over(path, tmp, &observed, own_pid, is_alive)? {
                return Ok(());
            }
        }
        Err(LockError::Contended {
            path: path.to_path_buf(),
        })
    }

    /// Rename `tmp` over a lock that still holds exactly `observed`.
    /// Returns `Ok(false)` when the caller should look at the lock again.
    fn take_over<F>(
        path: &Path,
        tmp: &Path,
        observed: &[u8],
        own_pid: u32,
        is_alive: &F,
    ) -> Result<bool, LockError>
    where
        F: Fn(u32) -> bool,
    {
        let marker = sibling(path, "takeover");
        match std::fs::hard_link(tmp, &marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return match read_record(&marker) {
                    Some(holder) if holder.pid != own_pid && is_alive(holder.pid) => {
                        Err(LockError::AlreadyRunning { pid: holder.pid })
                    }
                    _ => {
                        // Left behind by a starter that died mid-takeover.
                        remove_if_present(&marker)?;
                        Ok(false)
                    }
                };
            }
            Err(e) => return Err(LockError::io(&marker, e)),
        }

        let unchanged = std::fs::read(path).is_ok_and(|now| now == observed);
        let result = if unchanged {
            std::fs::rename(tmp, path)
                .map(|()| true)
                .map_err(|e| LockError::io(path, e))
        } else {
            Ok(false)
        };
        if let Err(e) = remove_if_present(&marker) {
            warn!(error = %e, "failed to remove takeover marker");
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the lock file if it still names this process. Idempotent.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match read_record(&self.path) {
            Some(record) if record.pid == self.pid => {
                std::fs::remove_file(&self.path).map_err(|e| LockError::io(&self.path, e))?;
                info!(pid = self.pid, "lock released");
            }
            Some(record) => {
                warn!(owner = record.pid, "lock now owned by another process, leaving it");
            }
            None => debug!("lock file already gone"),
        }
        Ok(())
    }
}

/// `<name>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<(), LockError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release lock");
        }
    }
}
