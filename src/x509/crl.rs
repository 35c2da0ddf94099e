// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Certificate revocation list assembly and parsing.
//!
//! The CRL is built the same way certificates are: the TBSCertList is
//! assembled from typed parts, DER-encoded, signed by the CA key, and
//! wrapped. Parsing reverses that and re-verifies the signature, so a
//! round trip through build/parse is loss-free for the revocation set.

use super::{Error, OID_SHA256_WITH_RSA, Result, asn1_time};
use crate::rsa;
use crate::x509::name::DistinguishedName;
use const_oid::db::rfc5280::ID_CE_CRL_REASONS;
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use serde::{Deserialize, Serialize};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::AuthorityKeyIdentifier;
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::certificate::Version;

/// Supported revocation reasons. Anything outside this set rejects at
/// the boundary rather than being coerced to `Unspecified`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    Superseded,
    CessationOfOperation,
}

impl RevocationReason {
    /// Stable string form used in the registry and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "key_compromise",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessation_of_operation",
        }
    }

    /// RFC 5280 CRLReason code.
    fn code(self) -> u8 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RevocationReason::Unspecified),
            1 => Ok(RevocationReason::KeyCompromise),
            4 => Ok(RevocationReason::Superseded),
            5 => Ok(RevocationReason::CessationOfOperation),
            _ => Err(Error::UnsupportedReasonCode { code }),
        }
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unspecified" => Ok(RevocationReason::Unspecified),
            "key_compromise" => Ok(RevocationReason::KeyCompromise),
            "superseded" => Ok(RevocationReason::Superseded),
            "cessation_of_operation" => Ok(RevocationReason::CessationOfOperation),
            other => Err(Error::UnsupportedReasonName {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One revoked certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrlEntry {
    /// Raw serial bytes as they appear in the certificate.
    pub serial: Vec<u8>,
    /// Revocation UNIX timestamp (seconds).
    pub revoked_at: u64,
    /// Revocation reason.
    pub reason: RevocationReason,
}

/// Parsed CRL contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrlInfo {
    /// thisUpdate UNIX timestamp (seconds).
    pub this_update: u64,
    /// nextUpdate UNIX timestamp (seconds).
    pub next_update: u64,
    /// Revocation entries in CRL order.
    pub entries: Vec<CrlEntry>,
}

// CRLReason is a bare ENUMERATED with single-byte content. The codec is
// written out here so the wire form stays pinned.
fn encode_reason(reason: RevocationReason) -> Vec<u8> {
    vec![0x0A, 0x01, reason.code()]
}

fn decode_reason(der: &[u8]) -> Result<RevocationReason> {
    match der {
        [0x0A, 0x01, code] => RevocationReason::from_code(*code),
        _ => Err(Error::Parse {
            details: "malformed CRLReason entry extension".to_string(),
        }),
    }
}

/// Builds and signs a version 2 CRL, returning its DER bytes.
pub fn build_crl(
    issuer_key: &rsa::SecretKey,
    issuer: &DistinguishedName,
    this_update: u64,
    next_update: u64,
    entries: &[CrlEntry],
) -> Result<Vec<u8>> {
    if issuer.attrs.is_empty() {
        return Err(Error::EmptyIssuerDn);
    }
    if this_update >= next_update {
        return Err(Error::InvalidValidityWindow);
    }

    let signature_alg = AlgorithmIdentifierOwned {
        oid: OID_SHA256_WITH_RSA,
        parameters: Some(der::asn1::Any::null()),
    };
    let issuer_name = issuer.to_x509_name()?;

    let mut revoked = Vec::with_capacity(entries.len());
    for entry in entries {
        let serial_number =
            SerialNumber::new(&entry.serial).map_err(|_| Error::InvalidSerial)?;
        revoked.push(RevokedCert {
            serial_number,
            revocation_date: asn1_time(entry.revoked_at)?,
            crl_entry_extensions: Some(vec![Extension {
                extn_id: ID_CE_CRL_REASONS,
                critical: false,
                extn_value: OctetString::new(encode_reason(entry.reason))?,
            }]),
        });
    }

    let aki = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(super::key_identifier(
            &issuer_key.public_key().to_pkcs1_der(),
        ))?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };
    let aki_ext = aki.to_extension(&issuer_name, &[])?;

    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: signature_alg.clone(),
        issuer: issuer_name,
        this_update: asn1_time(this_update)?,
        next_update: Some(asn1_time(next_update)?),
        revoked_certificates: if revoked.is_empty() {
            None
        } else {
            Some(revoked)
        },
        crl_extensions: Some(vec![aki_ext]),
    };

    let tbs_der = tbs_cert_list.to_der()?;
    let signature = issuer_key.sign(&tbs_der);

    let crl = CertificateList {
        tbs_cert_list,
        signature_algorithm: signature_alg,
        signature: BitString::from_bytes(signature.as_bytes())?,
    };
    Ok(crl.to_der()?)
}

/// Parses a DER CRL and verifies its signature under the issuer key.
pub fn parse_crl(der: &[u8], issuer_pub: &rsa::PublicKey) -> Result<CrlInfo> {
    let crl = CertificateList::from_der(der).map_err(|e| Error::Parse {
        details: e.to_string(),
    })?;

    if crl.signature_algorithm.oid != OID_SHA256_WITH_RSA
        || crl.tbs_cert_list.signature.oid != OID_SHA256_WITH_RSA
    {
        return Err(Error::SignatureMismatch);
    }
    let tbs_der = crl.tbs_cert_list.to_der()?;
    let sig_bytes = crl
        .signature
        .as_bytes()
        .ok_or(Error::SignatureMismatch)?;
    issuer_pub
        .verify(&tbs_der, &rsa::Signature::from_bytes(sig_bytes))
        .map_err(|_| Error::SignatureMismatch)?;

    let this_update = crl.tbs_cert_list.this_update.to_unix_duration().as_secs();
    let next_update = crl
        .tbs_cert_list
        .next_update
        .ok_or_else(|| Error::Parse {
            details: "CRL is missing nextUpdate".to_string(),
        })?
        .to_unix_duration()
        .as_secs();

    let mut entries = Vec::new();
    for revoked in crl.tbs_cert_list.revoked_certificates.unwrap_or_default() {
        let reason = match revoked
            .crl_entry_extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|ext| ext.extn_id == ID_CE_CRL_REASONS)
        {
            Some(ext) => decode_reason(ext.extn_value.as_bytes())?,
            None => RevocationReason::Unspecified,
        };
        entries.push(CrlEntry {
            serial: revoked.serial_number.as_bytes().to_vec(),
            revoked_at: revoked.revocation_date.to_unix_duration().as_secs(),
            reason,
        });
    }

    Ok(CrlInfo {
        this_update,
        next_update,
        entries,
    })
}
