// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Revocation set and CRL production.
//!
//! The revocation set is this store's own persistent document; the
//! registry's status flag is maintained separately by the orchestration
//! layer so each store stays authoritative for its own file. The signed
//! CRL is cached between revocations and rebuilt when invalidated or
//! past its nextUpdate.

use crate::pem;
use crate::rsa;
use crate::store::{self, Deadline, StoreError};
use crate::x509::{self, CrlEntry, DistinguishedName, RevocationReason};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// One revocation, keyed by hex serial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub serial: String,
    pub revoked_at: DateTime<Utc>,
    pub reason: RevocationReason,
}

/// On-disk document shape: `{"revocations": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RevocationDocument {
    revocations: Vec<RevocationEntry>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, RevocationEntry>,
    // Cached CRL PEM plus its nextUpdate; cleared on revoke.
    cached: Option<(String, DateTime<Utc>)>,
}

/// Errors from revocation operations.
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("revocation document is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    X509(#[from] x509::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The revocation store. `is_revoked` is the validator's hot path;
/// everything else runs on administrative operations.
#[derive(Debug)]
pub struct RevocationList {
    path: PathBuf,
    crl_path: PathBuf,
    validity: Duration,
    inner: Mutex<State>,
}

impl RevocationList {
    /// Opens the revocation store under `ca_dir`.
    pub fn open(
        ca_dir: impl Into<PathBuf>,
        validity: Duration,
    ) -> Result<Self, RevocationError> {
        let ca_dir = ca_dir.into();
        let path = ca_dir.join("revocations.json");
        let crl_path = ca_dir.join("crl.pem");

        let mut entries = BTreeMap::new();
        if path.exists() {
            let raw = std::fs::read(&path).map_err(StoreError::from)?;
            let doc: RevocationDocument = serde_json::from_slice(&raw)
                .map_err(|e| RevocationError::Corrupt(e.to_string()))?;
            for entry in doc.revocations {
                entries.insert(entry.serial.clone(), entry);
            }
        }
        Ok(Self {
            path,
            crl_path,
            validity,
            inner: Mutex::new(State {
                entries,
                cached: None,
            }),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, RevocationEntry>) -> Result<(), StoreError> {
        store::write_json_atomic(
            &self.path,
            &RevocationDocument {
                revocations: entries.values().cloned().collect(),
            },
        )
    }

    /// Adds a revocation. Idempotent: revoking an already-revoked serial
    /// is a no-op and returns `false`.
    pub fn revoke(
        &self,
        serial: &str,
        reason: RevocationReason,
        at: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<bool, RevocationError> {
        let mut state = store::lock(&self.inner, deadline)?;
        if state.entries.contains_key(serial) {
            return Ok(false);
        }
        let mut next = state.entries.clone();
        next.insert(
            serial.to_string(),
            RevocationEntry {
                serial: serial.to_string(),
                revoked_at: at,
                reason,
            },
        );
        self.persist(&next)?;
        state.entries = next;
        state.cached = None;
        info!(serial, reason = reason.as_str(), "certificate revoked");
        Ok(true)
    }

    /// Whether a serial is in the revocation set.
    pub fn is_revoked(&self, serial: &str, deadline: Deadline) -> Result<bool, StoreError> {
        let state = store::lock(&self.inner, deadline)?;
        Ok(state.entries.contains_key(serial))
    }

    /// Snapshot of all revocations, ordered by serial.
    pub fn entries(&self, deadline: Deadline) -> Result<Vec<RevocationEntry>, StoreError> {
        let state = store::lock(&self.inner, deadline)?;
        Ok(state.entries.values().cloned().collect())
    }

    /// Returns the current CA-signed CRL as PEM, rebuilding it when the
    /// cache was invalidated by a revoke or has passed its nextUpdate.
    /// Rebuilds are persisted to `crl.pem`.
    pub fn current_crl(
        &self,
        ca_key: &rsa::SecretKey,
        ca_subject: &DistinguishedName,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<String, RevocationError> {
        let mut state = store::lock(&self.inner, deadline)?;
        if let Some((pem_doc, next_update)) = &state.cached
            && now < *next_update
        {
            return Ok(pem_doc.clone());
        }

        let next_update = now + self.validity;
        let mut crl_entries = Vec::with_capacity(state.entries.len());
        for entry in state.entries.values() {
            let serial = hex::decode(&entry.serial).map_err(|_| x509::Error::InvalidSerial)?;
            crl_entries.push(CrlEntry {
                serial,
                revoked_at: entry.revoked_at.timestamp().max(0) as u64,
                reason: entry.reason,
            });
        }
        let der = x509::build_crl(
            ca_key,
            ca_subject,
            now.timestamp().max(0) as u64,
            next_update.timestamp().max(0) as u64,
            &crl_entries,
        )?;
        let pem_doc = pem::encode("X509 CRL", &der);
        store::write_atomic(&self.crl_path, pem_doc.as_bytes())?;
        state.cached = Some((pem_doc.clone(), next_update));
        info!(entries = crl_entries.len(), "regenerated CRL");
        Ok(pem_doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ca_dn() -> DistinguishedName {
        DistinguishedName::new()
            .organization("College")
            .common_name("College Root CA")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn open_store() -> (tempfile::TempDir, RevocationList) {
        let dir = tempfile::tempdir().unwrap();
        let store = RevocationList::open(dir.path(), Duration::days(7)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (_dir, store) = open_store();
        assert!(
            store
                .revoke("ab01", RevocationReason::KeyCompromise, now(), Deadline::none())
                .unwrap()
        );
        assert!(
            !store
                .revoke("ab01", RevocationReason::Superseded, now(), Deadline::none())
                .unwrap()
        );
        assert!(store.is_revoked("ab01", Deadline::none()).unwrap());
        assert!(!store.is_revoked("ab02", Deadline::none()).unwrap());

        // First reason wins; the duplicate revoke did not overwrite it.
        let entries = store.entries(Deadline::none()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, RevocationReason::KeyCompromise);
    }

    #[test]
    fn test_revocations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RevocationList::open(dir.path(), Duration::days(7)).unwrap();
            store
                .revoke("ab01", RevocationReason::Unspecified, now(), Deadline::none())
                .unwrap();
        }
        let reopened = RevocationList::open(dir.path(), Duration::days(7)).unwrap();
        assert!(reopened.is_revoked("ab01", Deadline::none()).unwrap());
    }

    #[test]
    fn test_current_crl_contains_revocations() {
        let (dir, store) = open_store();
        let ca = rsa::SecretKey::generate(2048).unwrap();
        let serial_hex = hex::encode(crate::rand::serial());
        store
            .revoke(
                &serial_hex,
                RevocationReason::KeyCompromise,
                now(),
                Deadline::none(),
            )
            .unwrap();

        let crl_pem = store
            .current_crl(&ca, &ca_dn(), now(), Deadline::none())
            .unwrap();
        let der = pem::decode_labeled(&crl_pem, "X509 CRL").unwrap();
        let info = x509::parse_crl(&der, &ca.public_key()).unwrap();
        assert_eq!(info.entries.len(), 1);
        assert_eq!(hex::encode(&info.entries[0].serial), serial_hex);
        assert_eq!(info.entries[0].reason, RevocationReason::KeyCompromise);
        assert_eq!(info.next_update - info.this_update, 7 * 24 * 3600);

        // The CRL also landed on disk.
        assert!(dir.path().join("crl.pem").exists());
    }

    #[test]
    fn test_crl_cache_invalidated_by_revoke() {
        let (_dir, store) = open_store();
        let ca = rsa::SecretKey::generate(2048).unwrap();

        let first = store
            .current_crl(&ca, &ca_dn(), now(), Deadline::none())
            .unwrap();
        let cached = store
            .current_crl(&ca, &ca_dn(), now() + Duration::seconds(5), Deadline::none())
            .unwrap();
        assert_eq!(first, cached);

        store
            .revoke("ab01", RevocationReason::Superseded, now(), Deadline::none())
            .unwrap();
        let rebuilt = store
            .current_crl(&ca, &ca_dn(), now() + Duration::seconds(10), Deadline::none())
            .unwrap();
        assert_ne!(first, rebuilt);
    }
}
