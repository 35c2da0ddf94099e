// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! End-entity certificate validation.
//!
//! The checks run in a fixed short-circuit order that callers rely on
//! for denial classification: parse, issuer match, signature, validity
//! window, revocation, basic constraints, key usage, extended key usage,
//! kind match. Parsing is done with `x509-parser`, independent of the
//! builder-side encoder.

use crate::ca::CertificateAuthority;
use crate::pem;
use crate::registry::CertKind;
use crate::revocation::RevocationList;
use crate::rsa;
use crate::store::{Deadline, StoreError};
use crate::x509::ROOM_BINDING_PREFIX;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};

const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";

/// Validation failures, one per check stage.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("certificate is not well-formed PEM/DER")]
    BadEncoding,
    #[error("certificate was not issued by this authority")]
    UntrustedIssuer,
    #[error("certificate signature is invalid")]
    InvalidSignature,
    #[error("certificate has expired")]
    Expired,
    #[error("certificate is not yet valid")]
    NotYetValid,
    #[error("certificate has been revoked")]
    Revoked,
    #[error("certificate basic constraints are missing or wrong")]
    InvalidExtension,
    #[error("certificate key usage does not permit digital signatures")]
    InvalidKeyUsage,
    #[error("certificate extended key usage does not permit client authentication")]
    InvalidExtendedKeyUsage,
    #[error("certificate subject kind does not match the expected kind")]
    KindMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identity extracted from a successfully validated certificate.
#[derive(Clone, Debug)]
pub struct SubjectInfo {
    pub kind: CertKind,
    pub subject_id: String,
    /// Lowercase hex serial.
    pub serial: String,
    pub public_key: rsa::PublicKey,
    /// Room binding from the SubjectAlternativeName, doors only.
    pub room_id: Option<String>,
}

/// Validates presented certificates against the CA and the revocation
/// store. Holds read-only material only; the dependency on the CA is a
/// snapshot of its public key and subject taken at construction.
pub struct CertificateValidator {
    ca_public: rsa::PublicKey,
    ca_subject_raw: Vec<u8>,
    revocations: Arc<RevocationList>,
}

impl CertificateValidator {
    pub fn new(ca: &CertificateAuthority, revocations: Arc<RevocationList>) -> Self {
        Self {
            ca_public: ca.public_key(),
            ca_subject_raw: ca.subject_raw().to_vec(),
            revocations,
        }
    }

    /// Runs the full check sequence and extracts the subject identity.
    pub fn validate(
        &self,
        cert_pem: &str,
        expected: CertKind,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<SubjectInfo, ValidateError> {
        // 1. Parse.
        let der =
            pem::decode_labeled(cert_pem, "CERTIFICATE").map_err(|_| ValidateError::BadEncoding)?;
        let (rem, cert) =
            x509_parser::parse_x509_certificate(&der).map_err(|_| ValidateError::BadEncoding)?;
        if !rem.is_empty() {
            return Err(ValidateError::BadEncoding);
        }

        // 2. Issuer DN must equal the CA subject DN, byte for byte.
        if cert.tbs_certificate.issuer.as_raw() != self.ca_subject_raw.as_slice() {
            return Err(ValidateError::UntrustedIssuer);
        }

        // 3. Signature over the TBSCertificate under the CA key.
        self.check_signature(&cert)?;

        // 4. Validity window.
        let ts = now.timestamp();
        if ts < cert.tbs_certificate.validity.not_before.timestamp() {
            return Err(ValidateError::NotYetValid);
        }
        if ts > cert.tbs_certificate.validity.not_after.timestamp() {
            return Err(ValidateError::Expired);
        }

        // 5. Revocation.
        let serial = hex::encode(cert.tbs_certificate.raw_serial());
        if self.revocations.is_revoked(&serial, deadline)? {
            return Err(ValidateError::Revoked);
        }

        // 6-8. Extension gates.
        let extensions = parse_extensions(&cert);
        match extensions.basic_constraints_ca {
            Some(false) => {}
            // Missing, or a CA certificate presented as an end entity.
            _ => return Err(ValidateError::InvalidExtension),
        }
        if !extensions.digital_signature {
            return Err(ValidateError::InvalidKeyUsage);
        }
        if !extensions.client_auth {
            return Err(ValidateError::InvalidExtendedKeyUsage);
        }

        // 9. Kind match, derived from the subject CN.
        let (kind, subject_id) = subject_kind(&cert).ok_or(ValidateError::KindMismatch)?;
        if kind != expected {
            return Err(ValidateError::KindMismatch);
        }

        let public_key = rsa::PublicKey::from_der(cert.tbs_certificate.subject_pki.raw)
            .map_err(|_| ValidateError::BadEncoding)?;

        Ok(SubjectInfo {
            kind,
            subject_id,
            serial,
            public_key,
            room_id: extensions.room_id,
        })
    }

    fn check_signature(&self, cert: &X509Certificate<'_>) -> Result<(), ValidateError> {
        let outer = cert.signature_algorithm.algorithm.to_id_string();
        let inner = cert.tbs_certificate.signature.algorithm.to_id_string();
        if outer != OID_SHA256_WITH_RSA || inner != OID_SHA256_WITH_RSA {
            return Err(ValidateError::InvalidSignature);
        }
        self.ca_public
            .verify(
                cert.tbs_certificate.as_ref(),
                &rsa::Signature::from_bytes(cert.signature_value.data.as_ref()),
            )
            .map_err(|_| ValidateError::InvalidSignature)
    }
}

#[derive(Default)]
struct ParsedGates {
    basic_constraints_ca: Option<bool>,
    digital_signature: bool,
    client_auth: bool,
    room_id: Option<String>,
}

fn parse_extensions(cert: &X509Certificate<'_>) -> ParsedGates {
    let mut gates = ParsedGates::default();
    for ext in cert.tbs_certificate.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => {
                gates.basic_constraints_ca = Some(bc.ca);
            }
            ParsedExtension::KeyUsage(ku) => {
                gates.digital_signature = ku.digital_signature();
            }
            ParsedExtension::ExtendedKeyUsage(eku) => {
                gates.client_auth = eku.client_auth;
            }
            ParsedExtension::SubjectAlternativeName(san) => {
                gates.room_id = san.general_names.iter().find_map(|name| match name {
                    GeneralName::DirectoryName(dir) => dir
                        .iter_organizational_unit()
                        .filter_map(|ou| ou.as_str().ok())
                        .find_map(|ou| ou.strip_prefix(ROOM_BINDING_PREFIX))
                        .map(str::to_string),
                    _ => None,
                });
            }
            _ => {}
        }
    }
    gates
}

// Subject kind is carried in the CN as `<kind>_<id>`.
fn subject_kind(cert: &X509Certificate<'_>) -> Option<(CertKind, String)> {
    let cn = cert
        .tbs_certificate
        .subject
        .iter_common_name()
        .next()?
        .as_str()
        .ok()?;
    for (prefix, kind) in [
        ("student_", CertKind::Student),
        ("door_", CertKind::Door),
        ("server_", CertKind::Server),
    ] {
        if let Some(id) = cn.strip_prefix(prefix)
            && !id.is_empty()
        {
            return Some((kind, id.to_string()));
        }
    }
    None
}
