// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Shared store plumbing: deadline-bounded locking and atomic file writes.

use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

/// Infrastructure failures shared by all persistent stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("operation deadline expired before the lock was acquired")]
    Timeout,
    #[error("store lock is contended or poisoned")]
    LockContended,
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Io(std::io::Error::other(err))
    }
}

/// Caller-provided bound on how long an operation may wait for a lock.
///
/// `Deadline::none()` waits indefinitely. Expiry yields [`StoreError::Timeout`]
/// before any write has happened.
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline: lock acquisition may block indefinitely.
    pub fn none() -> Self {
        Deadline(None)
    }

    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// Deadline `timeout` from now.
    pub fn within(timeout: Duration) -> Self {
        Deadline(Some(Instant::now() + timeout))
    }

    fn expired(&self) -> bool {
        matches!(self.0, Some(t) if Instant::now() >= t)
    }
}

// Lock polling interval. Contention on these stores is short critical
// sections only, so a fine poll keeps added latency negligible.
const LOCK_POLL: Duration = Duration::from_micros(100);

/// Acquires a mutex, honouring the deadline.
pub fn lock<'a, T>(mutex: &'a Mutex<T>, deadline: Deadline) -> Result<MutexGuard<'a, T>, StoreError> {
    if deadline.0.is_none() {
        return mutex.lock().map_err(|_| StoreError::LockContended);
    }
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::LockContended),
            Err(TryLockError::WouldBlock) => {
                if deadline.expired() {
                    return Err(StoreError::Timeout);
                }
                std::thread::sleep(LOCK_POLL);
            }
        }
    }
}

/// Acquires a shared read lock, honouring the deadline.
pub fn read<'a, T>(
    lock: &'a RwLock<T>,
    deadline: Deadline,
) -> Result<RwLockReadGuard<'a, T>, StoreError> {
    if deadline.0.is_none() {
        return lock.read().map_err(|_| StoreError::LockContended);
    }
    loop {
        match lock.try_read() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::LockContended),
            Err(TryLockError::WouldBlock) => {
                if deadline.expired() {
                    return Err(StoreError::Timeout);
                }
                std::thread::sleep(LOCK_POLL);
            }
        }
    }
}

/// Acquires an exclusive write lock, honouring the deadline.
pub fn write<'a, T>(
    lock: &'a RwLock<T>,
    deadline: Deadline,
) -> Result<RwLockWriteGuard<'a, T>, StoreError> {
    if deadline.0.is_none() {
        return lock.write().map_err(|_| StoreError::LockContended);
    }
    loop {
        match lock.try_write() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::LockContended),
            Err(TryLockError::WouldBlock) => {
                if deadline.expired() {
                    return Err(StoreError::Timeout);
                }
                std::thread::sleep(LOCK_POLL);
            }
        }
    }
}

/// Atomically replaces `path` with `bytes` via write-to-temp + rename.
///
/// The temp file lives in the target directory so the rename never
/// crosses filesystems. Readers observe either the old or the new
/// document, never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    use std::io::Write;

    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::other("target path has no parent directory"))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Atomically serializes `value` as pretty JSON to `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
    write_atomic(path, &json)
}
