// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The assembled core and the access flow.
//!
//! [`Core`] is built once at program start and threaded through every
//! entry point; there is no hidden process-wide state. An access attempt
//! runs validate, consume, verify-signature, authorize, record in that
//! order; any failure yields a classified denial with no side effects
//! beyond the ones that are correct to keep (used nonces stay used).

use crate::attendance::{AttendanceLog, AttendanceQuery, AttendanceRecord, RecordError};
use crate::authz::{AuthorizationStore, AuthzError};
use crate::ca::{CaError, CertificateAuthority, IssueError, IssuedCertificate};
use crate::challenge::{
    Challenge, ChallengeError, ChallengeRegistry, format_timestamp,
};
use crate::config::SystemConfig;
use crate::registry::{CertKind, CertificateRegistry, RegistryError};
use crate::revocation::{RevocationError, RevocationList};
use crate::rsa::{self, CryptoError};
use crate::signature::{self, SignatureError};
use crate::store::{Deadline, StoreError};
use crate::validator::{CertificateValidator, ValidateError};
use crate::x509::RevocationReason;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Subject id under which the backend signing key is issued.
const BACKEND_SUBJECT_ID: &str = "attendance-backend";

/// Errors surfaced while assembling or administering the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Ca(#[from] CaError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Revocation(#[from] RevocationError),
    #[error(transparent)]
    Issue(#[from] IssueError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A classified denial. Every variant corresponds to one stage of the
/// access flow; infrastructure failures are split off before a denial
/// is reported.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Certificate(#[from] ValidateError),
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Authorization(#[from] AuthzError),
    #[error(transparent)]
    Recording(#[from] RecordError),
}

impl AccessError {
    /// Stable machine-readable code for logs and callers that dispatch
    /// by kind.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Certificate(e) => match e {
                ValidateError::BadEncoding => "bad_encoding",
                ValidateError::UntrustedIssuer => "untrusted_issuer",
                ValidateError::InvalidSignature => "invalid_signature",
                ValidateError::Expired => "certificate_expired",
                ValidateError::NotYetValid => "certificate_not_yet_valid",
                ValidateError::Revoked => "certificate_revoked",
                ValidateError::InvalidExtension => "invalid_extension",
                ValidateError::InvalidKeyUsage => "invalid_key_usage",
                ValidateError::InvalidExtendedKeyUsage => "invalid_extended_key_usage",
                ValidateError::KindMismatch => "kind_mismatch",
                ValidateError::Store(_) => "store_failure",
            },
            AccessError::Challenge(e) => match e {
                ChallengeError::ReplayedQr => "replayed_qr",
                ChallengeError::UnknownChallenge => "unknown_challenge",
                ChallengeError::AlreadyConsumed => "already_consumed",
                ChallengeError::ChallengeExpired => "challenge_expired",
                ChallengeError::Store(_) => "store_failure",
            },
            AccessError::Signature(e) => match e {
                SignatureError::VerifyFailed => "signature_verify_failed",
                SignatureError::MalformedSignature => "malformed_signature",
            },
            AccessError::Authorization(e) => match e {
                AuthzError::NotAuthorizedForRoom => "not_authorized_for_room",
                AuthzError::OutsideAccessWindow => "outside_access_window",
                AuthzError::Store(_) => "store_failure",
            },
            AccessError::Recording(e) => match e {
                RecordError::DuplicateRecord => "duplicate_record",
                RecordError::PersistFailed(_) => "persist_failed",
                RecordError::IntegrityViolation => "integrity_violation",
                RecordError::Store(_) => "store_failure",
            },
        }
    }

    // Splits infrastructure failures (timeouts, lock contention, I/O)
    // from protocol denials; the former are never reported as a DENY.
    fn into_denial(self) -> Result<Self, StoreError> {
        match self {
            AccessError::Certificate(ValidateError::Store(e))
            | AccessError::Challenge(ChallengeError::Store(e))
            | AccessError::Authorization(AuthzError::Store(e))
            | AccessError::Recording(RecordError::Store(e)) => Err(e),
            other => Ok(other),
        }
    }
}

/// Request from a door after scanning a QR code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub student_certificate_pem: String,
    pub previous_nonce: String,
    pub room_id: String,
    pub door_id: String,
}

/// Challenge handed back to the client for signing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub nonce: String,
    /// Canonical wire timestamp of challenge issuance.
    pub timestamp: String,
    pub room_id: String,
    pub door_id: String,
    pub previous_nonce: String,
}

impl ChallengeResponse {
    fn from_challenge(challenge: &Challenge) -> Self {
        Self {
            challenge_id: challenge.challenge_id.clone(),
            nonce: challenge.nonce.clone(),
            timestamp: format_timestamp(challenge.issued_at),
            room_id: challenge.room_id.clone(),
            door_id: challenge.door_id.clone(),
            previous_nonce: challenge.previous_nonce.clone(),
        }
    }
}

/// Signed challenge submitted for verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub challenge: ChallengeResponse,
    pub signature_hex: String,
    pub student_certificate_pem: String,
}

/// Outcome of a verification attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub access_granted: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_record: Option<AttendanceRecord>,
}

/// The wired system: CA, stores and protocol state, constructed once.
pub struct Core {
    registry: Arc<CertificateRegistry>,
    ca: CertificateAuthority,
    revocations: Arc<RevocationList>,
    validator: CertificateValidator,
    challenges: ChallengeRegistry,
    authz: AuthorizationStore,
    attendance: AttendanceLog,
    backend_public: rsa::PublicKey,
}

impl Core {
    /// Builds the core from configuration: loads or creates the CA,
    /// opens every store, and ensures the backend signing identity
    /// exists (a dedicated server certificate, not the CA key).
    pub fn open(cfg: &SystemConfig, now: DateTime<Utc>) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&cfg.ca_dir).map_err(StoreError::from)?;
        std::fs::create_dir_all(&cfg.certs_dir).map_err(StoreError::from)?;
        if let Some(parent) = cfg.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::from)?;
        }

        let registry = Arc::new(CertificateRegistry::open(
            cfg.ca_dir.join("cert_registry.json"),
        )?);
        let ca = CertificateAuthority::open(cfg, &registry, now)?;
        let revocations = Arc::new(RevocationList::open(&cfg.ca_dir, cfg.crl_validity())?);
        let validator = CertificateValidator::new(&ca, Arc::clone(&revocations));
        let challenges = ChallengeRegistry::new(cfg.challenge_ttl(), cfg.nonce_window());

        let conn = Connection::open(&cfg.db_path).map_err(StoreError::from)?;
        let conn = Arc::new(Mutex::new(conn));
        let authz = AuthorizationStore::new(Arc::clone(&conn))?;

        let backend_key = Self::backend_signer(cfg, &ca, &registry, now)?;
        let backend_public = backend_key.public_key();
        let attendance = AttendanceLog::new(conn, backend_key)?;

        Ok(Self {
            registry,
            ca,
            revocations,
            validator,
            challenges,
            authz,
            attendance,
            backend_public,
        })
    }

    // Loads the backend signing key from the standard layout, issuing a
    // fresh server identity on first start.
    fn backend_signer(
        cfg: &SystemConfig,
        ca: &CertificateAuthority,
        registry: &CertificateRegistry,
        now: DateTime<Utc>,
    ) -> Result<rsa::SecretKey, CoreError> {
        let key_path = cfg
            .certs_dir
            .join("servers")
            .join(BACKEND_SUBJECT_ID)
            .join("private_key.pem");
        if key_path.exists() {
            let pem_doc = std::fs::read_to_string(&key_path).map_err(StoreError::from)?;
            return Ok(rsa::SecretKey::from_pem(&pem_doc)?);
        }
        let issued = ca.issue_server(registry, BACKEND_SUBJECT_ID, now)?;
        info!(serial = %issued.serial, "issued backend signing identity");
        Ok(rsa::SecretKey::from_pem(&issued.private_key_pem)?)
    }

    /// The CA certificate as PEM, for distribution to doors and clients.
    pub fn ca_certificate_pem(&self) -> &str {
        self.ca.certificate_pem()
    }

    /// Public key verifying backend signatures on attendance records.
    pub fn backend_public_key(&self) -> &rsa::PublicKey {
        &self.backend_public
    }

    /// Issues a student identity.
    pub fn issue_student(
        &self,
        student_id: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IssuedCertificate, IssueError> {
        self.ca.issue_student(&self.registry, student_id, email, now)
    }

    /// Issues a door identity bound to a room.
    pub fn issue_door(
        &self,
        door_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCertificate, IssueError> {
        self.ca.issue_door(&self.registry, door_id, room_id, now)
    }

    /// Issues a server identity.
    pub fn issue_server(
        &self,
        server_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCertificate, IssueError> {
        self.ca.issue_server(&self.registry, server_id, now)
    }

    /// Revokes a certificate: marks the registry record, adds the
    /// revocation entry and regenerates the signed CRL.
    pub fn revoke_certificate(
        &self,
        serial: &str,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.registry
            .mark_revoked(serial, reason, now, Deadline::none())?;
        self.revocations
            .revoke(serial, reason, now, Deadline::none())?;
        self.revocations
            .current_crl(self.ca.key(), self.ca.subject_dn(), now, Deadline::none())?;
        Ok(())
    }

    /// Returns the current CA-signed CRL as PEM.
    pub fn current_crl(&self, now: DateTime<Utc>) -> Result<String, CoreError> {
        Ok(self
            .revocations
            .current_crl(self.ca.key(), self.ca.subject_dn(), now, Deadline::none())?)
    }

    /// Grants a student access to a room.
    pub fn authorize_student(
        &self,
        student_id: &str,
        room_id: &str,
        window: Option<(&str, &str)>,
    ) -> Result<(), CoreError> {
        Ok(self
            .authz
            .add_authorization(student_id, room_id, None, window, Deadline::none())?)
    }

    /// Enrolls a student in a course, materializing the room grant.
    pub fn enroll_student(
        &self,
        student_id: &str,
        course_id: &str,
        room_id: &str,
        schedule: Option<(&str, &str)>,
    ) -> Result<(), CoreError> {
        Ok(self
            .authz
            .add_enrollment(student_id, course_id, room_id, schedule, Deadline::none())?)
    }

    /// Queries attendance records.
    pub fn query_attendance(
        &self,
        filter: &AttendanceQuery,
    ) -> Result<Vec<AttendanceRecord>, CoreError> {
        Ok(self.attendance.query(filter, Deadline::none())?)
    }

    /// Garbage-collects expired challenges and aged-out seen nonces.
    pub fn sweep_challenges(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        Ok(self.challenges.sweep(now, Deadline::none())?)
    }

    /// Access flow, first half: validates the presented certificate and
    /// issues a pending challenge. Failures are classified denials.
    pub fn request_challenge(
        &self,
        request: &ChallengeRequest,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<ChallengeResponse, AccessError> {
        let result = self.request_challenge_inner(request, now, deadline);
        if let Err(denial) = &result {
            warn!(
                code = denial.code(),
                room_id = %request.room_id,
                door_id = %request.door_id,
                "challenge request denied"
            );
        }
        result
    }

    fn request_challenge_inner(
        &self,
        request: &ChallengeRequest,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<ChallengeResponse, AccessError> {
        let subject = self.validator.validate(
            &request.student_certificate_pem,
            CertKind::Student,
            now,
            deadline,
        )?;
        let challenge = self.challenges.generate(
            &subject.serial,
            &request.room_id,
            &request.door_id,
            &request.previous_nonce,
            now,
            deadline,
        )?;
        info!(
            student_id = %subject.subject_id,
            room_id = %request.room_id,
            challenge_id = %challenge.challenge_id,
            "challenge issued"
        );
        Ok(ChallengeResponse::from_challenge(&challenge))
    }

    /// Access flow, second half: re-validates the certificate, consumes
    /// the challenge, verifies the signature, authorizes and records.
    ///
    /// Protocol failures come back as a DENY response with a reason;
    /// only infrastructure faults surface as `Err`.
    pub fn verify_access(
        &self,
        request: &VerifyRequest,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<VerifyResponse, StoreError> {
        match self.verify_access_inner(request, now, deadline) {
            Ok((subject_id, record)) => {
                info!(
                    student_id = %subject_id,
                    room_id = %record.room_id,
                    door_id = %record.door_id,
                    "access granted"
                );
                Ok(VerifyResponse {
                    access_granted: true,
                    reason: "access granted".to_string(),
                    attendance_record: Some(record),
                })
            }
            Err(err) => {
                let denial = err.into_denial()?;
                warn!(
                    code = denial.code(),
                    room_id = %request.challenge.room_id,
                    door_id = %request.challenge.door_id,
                    "access denied"
                );
                Ok(VerifyResponse {
                    access_granted: false,
                    reason: denial.to_string(),
                    attendance_record: None,
                })
            }
        }
    }

    fn verify_access_inner(
        &self,
        request: &VerifyRequest,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<(String, AttendanceRecord), AccessError> {
        let subject = self.validator.validate(
            &request.student_certificate_pem,
            CertKind::Student,
            now,
            deadline,
        )?;

        // Atomic consume: the nonce is burned even if a later stage
        // fails, which is the correct irreversible side effect.
        let challenge = self
            .challenges
            .consume(&request.challenge.nonce, now, deadline)?;

        // The submitted challenge must be the issued one, field for
        // field, and bound to the same certificate.
        let submitted = &request.challenge;
        if challenge.challenge_id != submitted.challenge_id
            || challenge.room_id != submitted.room_id
            || challenge.door_id != submitted.door_id
            || challenge.previous_nonce != submitted.previous_nonce
            || format_timestamp(challenge.issued_at) != submitted.timestamp
            || challenge.subject_serial != subject.serial
        {
            return Err(ChallengeError::UnknownChallenge.into());
        }

        signature::verify_challenge(&subject.public_key, &challenge, &request.signature_hex)?;

        self.authz
            .is_authorized(&subject.subject_id, &challenge.room_id, now, deadline)?;

        let record = self.attendance.record(
            &subject.subject_id,
            &challenge.room_id,
            &challenge.door_id,
            now,
            deadline,
        )?;
        Ok((subject.subject_id, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{canonical_challenge_bytes, parse_timestamp};
    use chrono::{Duration, TimeZone};

    const PREV: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 30, 0).unwrap()
    }

    struct World {
        _dir: tempfile::TempDir,
        core: Core,
    }

    fn world() -> World {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SystemConfig::for_data_dir(dir.path());
        let core = Core::open(&cfg, t0()).unwrap();
        World { _dir: dir, core }
    }

    // Plays the client: signs the canonical bytes reconstructed from
    // the wire challenge, exactly as the QR-display client would.
    fn sign_challenge(key: &rsa::SecretKey, challenge: &ChallengeResponse) -> String {
        let bytes = canonical_challenge_bytes(
            &challenge.nonce,
            parse_timestamp(&challenge.timestamp).unwrap(),
            &challenge.room_id,
            &challenge.door_id,
            &challenge.previous_nonce,
            &challenge.challenge_id,
        );
        key.sign(&bytes).to_hex()
    }

    fn challenge_request(cert_pem: &str, prev: &str) -> ChallengeRequest {
        ChallengeRequest {
            student_certificate_pem: cert_pem.to_string(),
            previous_nonce: prev.to_string(),
            room_id: "CS101".to_string(),
            door_id: "door_001".to_string(),
        }
    }

    #[test]
    fn test_happy_path_grants_and_records() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "CS101", None)
            .unwrap();

        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(5),
                Deadline::none(),
            )
            .unwrap();

        assert!(response.access_granted);
        let record = response.attendance_record.expect("record present");
        assert_eq!(record.student_id, "student_001");
        assert_eq!(record.room_id, "CS101");

        // The stored record is independently verifiable (P9).
        AttendanceLog::verify_record(w.core.backend_public_key(), &record).unwrap();

        let rows = w
            .core
            .query_attendance(&AttendanceQuery {
                student_id: Some("student_001".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], record);
    }

    #[test]
    fn test_replayed_qr_nonce_is_denied() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();

        w.core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        // Same QR nonce again, within the window.
        let err = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0() + Duration::seconds(60),
                Deadline::none(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Challenge(ChallengeError::ReplayedQr)
        ));
    }

    #[test]
    fn test_expired_challenge_is_denied_without_record() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "CS101", None)
            .unwrap();

        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        // 31 seconds later the 30-second TTL has elapsed.
        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(31),
                Deadline::none(),
            )
            .unwrap();
        assert!(!response.access_granted);
        assert!(response.reason.contains("expired"));
        assert!(response.attendance_record.is_none());

        assert!(w.core.query_attendance(&AttendanceQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_revoked_certificate_is_denied_everywhere() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "CS101", None)
            .unwrap();

        // Challenge obtained before the revocation lands.
        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        w.core
            .revoke_certificate(&issued.serial, RevocationReason::KeyCompromise, t0())
            .unwrap();

        // New challenges are refused outright.
        let err = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, "bb01"),
                t0() + Duration::seconds(2),
                Deadline::none(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Certificate(ValidateError::Revoked)
        ));

        // And the pre-obtained challenge no longer verifies.
        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(5),
                Deadline::none(),
            )
            .unwrap();
        assert!(!response.access_granted);
        assert!(response.reason.contains("revoked"));
    }

    #[test]
    fn test_tampered_signature_is_denied() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "CS101", None)
            .unwrap();

        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        // Flip one bit in the hex signature.
        let mut sig = sign_challenge(&key, &challenge).into_bytes();
        sig[0] = if sig[0] == b'0' { b'1' } else { b'0' };
        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: String::from_utf8(sig).unwrap(),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(5),
                Deadline::none(),
            )
            .unwrap();
        assert!(!response.access_granted);
        assert!(w.core.query_attendance(&AttendanceQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_unauthorized_room_is_denied_without_record() {
        let w = world();
        let issued = w.core.issue_student("student_002", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        // No authorization for CS101.

        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(5),
                Deadline::none(),
            )
            .unwrap();
        assert!(!response.access_granted);
        assert_eq!(response.reason, "student is not authorized for this room");
        assert!(w.core.query_attendance(&AttendanceQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_signed_challenge_cannot_be_replayed() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "CS101", None)
            .unwrap();

        let challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();
        let request = VerifyRequest {
            signature_hex: sign_challenge(&key, &challenge),
            challenge,
            student_certificate_pem: issued.certificate_pem.clone(),
        };

        let first = w
            .core
            .verify_access(&request, t0() + Duration::seconds(5), Deadline::none())
            .unwrap();
        assert!(first.access_granted);

        // Submitting the same signed challenge again hits the consumed
        // state, not a second grant.
        let second = w
            .core
            .verify_access(&request, t0() + Duration::seconds(6), Deadline::none())
            .unwrap();
        assert!(!second.access_granted);
        assert!(second.reason.contains("consumed"));
    }

    #[test]
    fn test_mismatched_challenge_fields_are_denied() {
        let w = world();
        let issued = w.core.issue_student("student_001", None, t0()).unwrap();
        let key = rsa::SecretKey::from_pem(&issued.private_key_pem).unwrap();
        w.core
            .authorize_student("student_001", "LAB1", None)
            .unwrap();

        let mut challenge = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap();

        // The client rewrites the room before signing; the nonce still
        // resolves but the field comparison fails.
        challenge.room_id = "LAB1".to_string();
        let response = w
            .core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: issued.certificate_pem.clone(),
                },
                t0() + Duration::seconds(5),
                Deadline::none(),
            )
            .unwrap();
        assert!(!response.access_granted);
        assert!(w.core.query_attendance(&AttendanceQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_door_certificate_cannot_request_student_challenge() {
        let w = world();
        let issued = w.core.issue_door("door_001", "CS101", t0()).unwrap();

        let err = w
            .core
            .request_challenge(
                &challenge_request(&issued.certificate_pem, PREV),
                t0(),
                Deadline::none(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Certificate(ValidateError::KindMismatch)
        ));
    }

    #[test]
    fn test_core_reopen_preserves_identities() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SystemConfig::for_data_dir(dir.path());

        let (cert_pem, key_pem) = {
            let core = Core::open(&cfg, t0()).unwrap();
            let issued = core.issue_student("student_001", None, t0()).unwrap();
            core.authorize_student("student_001", "CS101", None).unwrap();
            (issued.certificate_pem, issued.private_key_pem)
        };

        // A fresh process loads the same CA and still accepts the cert.
        let core = Core::open(&cfg, t0() + Duration::minutes(1)).unwrap();
        let key = rsa::SecretKey::from_pem(&key_pem).unwrap();
        let challenge = core
            .request_challenge(
                &challenge_request(&cert_pem, PREV),
                t0() + Duration::minutes(2),
                Deadline::none(),
            )
            .unwrap();
        let response = core
            .verify_access(
                &VerifyRequest {
                    signature_hex: sign_challenge(&key, &challenge),
                    challenge,
                    student_certificate_pem: cert_pem.clone(),
                },
                t0() + Duration::minutes(2) + Duration::seconds(3),
                Deadline::none(),
            )
            .unwrap();
        assert!(response.access_granted);
    }
}
