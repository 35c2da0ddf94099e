// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Persistent catalog of issued certificates.
//!
//! The registry is a single canonical JSON document, rewritten atomically
//! on every mutation. Records are created at issuance, mutated only by
//! revocation and never deleted.

use crate::store::{self, Deadline, StoreError};
use crate::x509::RevocationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// Identity kind encoded in a certificate subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertKind {
    Ca,
    Student,
    Door,
    Server,
}

impl CertKind {
    /// Stable string form used in logs and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertKind::Ca => "ca",
            CertKind::Student => "student",
            CertKind::Door => "door",
            CertKind::Server => "server",
        }
    }
}

impl std::fmt::Display for CertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an issued certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    Active,
    Revoked,
}

/// One catalog entry per issued certificate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Lowercase hex serial, unique within the registry.
    pub serial: String,
    pub kind: CertKind,
    pub subject_id: String,
    pub issued_at: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub status: CertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RevocationReason>,
}

/// On-disk document shape: `{"certificates": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    certificates: Vec<CertificateRecord>,
}

/// Filter for [`CertificateRegistry::list`]. Empty filter matches all.
#[derive(Clone, Debug, Default)]
pub struct RegistryFilter {
    pub kind: Option<CertKind>,
    pub status: Option<CertStatus>,
    pub subject_id: Option<String>,
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("serial {0} already present in registry")]
    DuplicateSerial(String),
    #[error("serial {0} not present in registry")]
    UnknownSerial(String),
    #[error("serial {0} is already revoked")]
    AlreadyRevoked(String),
    #[error("registry document is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistent map of issued certificates, keyed by serial with a
/// `(kind, subject_id)` secondary lookup.
#[derive(Debug)]
pub struct CertificateRegistry {
    path: PathBuf,
    inner: RwLock<Vec<CertificateRecord>>,
}

impl CertificateRegistry {
    /// Opens the registry document at `path`, creating an empty one if
    /// it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let records = if path.exists() {
            let raw = std::fs::read(&path).map_err(StoreError::from)?;
            let doc: RegistryDocument =
                serde_json::from_slice(&raw).map_err(|e| RegistryError::Corrupt(e.to_string()))?;
            doc.certificates
        } else {
            store::write_json_atomic(&path, &RegistryDocument::default())?;
            Vec::new()
        };
        Ok(Self {
            path,
            inner: RwLock::new(records),
        })
    }

    fn persist(&self, records: &[CertificateRecord]) -> Result<(), StoreError> {
        store::write_json_atomic(
            &self.path,
            &RegistryDocument {
                certificates: records.to_vec(),
            },
        )
    }

    /// Appends a new record. Fails on duplicate serial; the document on
    /// disk is updated before the in-memory snapshot commits.
    pub fn insert(
        &self,
        record: CertificateRecord,
        deadline: Deadline,
    ) -> Result<(), RegistryError> {
        let mut guard = store::write(&self.inner, deadline)?;
        if guard.iter().any(|r| r.serial == record.serial) {
            return Err(RegistryError::DuplicateSerial(record.serial));
        }
        let mut next = guard.clone();
        next.push(record);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    /// Flips a record to revoked. Fails if the serial is unknown or the
    /// record is already revoked.
    pub fn mark_revoked(
        &self,
        serial: &str,
        reason: RevocationReason,
        at: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<CertificateRecord, RegistryError> {
        let mut guard = store::write(&self.inner, deadline)?;
        let mut next = guard.clone();
        let record = next
            .iter_mut()
            .find(|r| r.serial == serial)
            .ok_or_else(|| RegistryError::UnknownSerial(serial.to_string()))?;
        if record.status == CertStatus::Revoked {
            return Err(RegistryError::AlreadyRevoked(serial.to_string()));
        }
        record.status = CertStatus::Revoked;
        record.revoked_at = Some(at);
        record.reason = Some(reason);
        let updated = record.clone();
        self.persist(&next)?;
        *guard = next;
        Ok(updated)
    }

    /// Looks up a record by its hex serial.
    pub fn lookup_by_serial(
        &self,
        serial: &str,
        deadline: Deadline,
    ) -> Result<Option<CertificateRecord>, RegistryError> {
        let guard = store::read(&self.inner, deadline)?;
        Ok(guard.iter().find(|r| r.serial == serial).cloned())
    }

    /// Looks up the active record for a `(kind, subject_id)` pair.
    /// Revoked records for the same subject do not shadow it.
    pub fn lookup_by_subject(
        &self,
        kind: CertKind,
        subject_id: &str,
        deadline: Deadline,
    ) -> Result<Option<CertificateRecord>, RegistryError> {
        let guard = store::read(&self.inner, deadline)?;
        Ok(guard
            .iter()
            .find(|r| r.kind == kind && r.subject_id == subject_id && r.status == CertStatus::Active)
            .cloned())
    }

    /// Lists records matching the filter, in issuance order.
    pub fn list(
        &self,
        filter: &RegistryFilter,
        deadline: Deadline,
    ) -> Result<Vec<CertificateRecord>, RegistryError> {
        let guard = store::read(&self.inner, deadline)?;
        Ok(guard
            .iter()
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                filter
                    .subject_id
                    .as_deref()
                    .is_none_or(|id| r.subject_id == id)
            })
            .cloned()
            .collect())
    }
}
