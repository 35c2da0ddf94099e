// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! X.509 certificate and CRL assembly.
//!
//! https://datatracker.ietf.org/doc/html/rfc5280
//!
//! Building goes through typed `x509-cert` structures signed with the
//! issuer's RSA key; the validator parses independently with
//! `x509-parser` so the two directions cannot share an encoding bug.

use const_oid::ObjectIdentifier;
use sha1::{Digest, Sha1};
use std::time::Duration;
use x509_cert::time::Time;

mod crl;
mod error;
mod issue;
mod name;

pub use crl::{CrlEntry, CrlInfo, RevocationReason, build_crl, parse_crl};
pub use error::{Error, Result};
pub use issue::{CertificateParams, CertificateProfile, build_cert};
pub use name::{DistinguishedName, NameAttribute, NameValue};

/// sha256WithRSAEncryption (RFC 4055).
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// Prefix of the SubjectAlternativeName OU entry that binds a door
/// certificate to its room. Frozen wire form.
pub const ROOM_BINDING_PREFIX: &str = "Room:";

/// Computes a key identifier: the SHA-1 hash of the subjectPublicKey
/// BIT STRING payload (for RSA, the PKCS#1 RSAPublicKey DER).
pub(crate) fn key_identifier(subject_public_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(subject_public_key);
    hasher.finalize().to_vec()
}

// RFC 5280 switches from UTCTime to GeneralizedTime at 2050.
const UTC_TIME_CEILING: u64 = 2_524_608_000; // 2050-01-01T00:00:00Z

/// Converts a UNIX timestamp into the ASN.1 time choice RFC 5280 wants.
pub(crate) fn asn1_time(ts: u64) -> Result<Time> {
    let d = Duration::from_secs(ts);
    if ts < UTC_TIME_CEILING {
        Ok(Time::UtcTime(der::asn1::UtcTime::from_unix_duration(d)?))
    } else {
        Ok(Time::GeneralTime(
            der::asn1::GeneralizedTime::from_unix_duration(d)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_identifier_is_sha1_sized() {
        assert_eq!(key_identifier(b"any key bytes").len(), 20);
    }

    #[test]
    fn test_asn1_time_switches_encoding_at_2050() {
        assert!(matches!(
            asn1_time(1_700_000_000).unwrap(),
            Time::UtcTime(_)
        ));
        assert!(matches!(
            asn1_time(UTC_TIME_CEILING).unwrap(),
            Time::GeneralTime(_)
        ));
    }
}
