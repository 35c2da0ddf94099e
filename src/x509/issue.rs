// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, OID_SHA256_WITH_RSA, ROOM_BINDING_PREFIX, Result, asn1_time, key_identifier};
use crate::rsa;
use crate::x509::name::DistinguishedName;
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use x509_cert::certificate::{CertificateInner, TbsCertificateInner, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;

/// Certificate profile selecting the mandatory extension set.
#[derive(Clone, Debug)]
pub enum CertificateProfile {
    /// Self-signed trust root: `BasicConstraints{CA=true}`,
    /// `KeyUsage{keyCertSign, cRLSign, digitalSignature}`.
    Authority,
    /// End entity: `BasicConstraints{CA=false}`,
    /// `KeyUsage{digitalSignature}`, plus the given extended key usages
    /// and an optional room binding carried in the SubjectAlternativeName.
    EndEntity {
        ext_key_usage: Vec<ObjectIdentifier>,
        room_binding: Option<String>,
    },
}

/// Inputs for certificate assembly.
#[derive(Clone, Debug)]
pub struct CertificateParams {
    /// Subject distinguished name.
    pub subject: DistinguishedName,
    /// Issuer distinguished name (equals subject for the trust root).
    pub issuer: DistinguishedName,
    /// Raw serial bytes, positive DER INTEGER shape.
    pub serial: Vec<u8>,
    /// NotBefore UNIX timestamp (seconds).
    pub not_before: u64,
    /// NotAfter UNIX timestamp (seconds).
    pub not_after: u64,
    /// Extension profile.
    pub profile: CertificateProfile,
}

/// Assembles and signs an X.509 v3 certificate, returning its DER bytes.
///
/// The TBSCertificate is encoded, signed sha256WithRSAEncryption by the
/// issuer key, and wrapped without re-parsing. Key identifiers are the
/// SHA-1 of the subjectPublicKey BIT STRING payload, the same derivation
/// every peer recomputes during validation.
pub fn build_cert(
    subject_key: &rsa::PublicKey,
    issuer_key: &rsa::SecretKey,
    params: &CertificateParams,
) -> Result<Vec<u8>> {
    if params.subject.attrs.is_empty() {
        return Err(Error::EmptySubjectDn);
    }
    if params.issuer.attrs.is_empty() {
        return Err(Error::EmptyIssuerDn);
    }
    if params.not_before >= params.not_after {
        return Err(Error::InvalidValidityWindow);
    }
    if params.serial.is_empty() || params.serial[0] & 0x80 != 0 {
        return Err(Error::InvalidSerial);
    }
    let serial_number: SerialNumber = SerialNumber::new(&params.serial).map_err(|_| Error::InvalidSerial)?;

    // RSA signature algorithms carry an explicit NULL parameter.
    let signature_alg = AlgorithmIdentifierOwned {
        oid: OID_SHA256_WITH_RSA,
        parameters: Some(der::asn1::Any::null()),
    };

    let subject_name = params.subject.to_x509_name()?;
    let issuer_name = params.issuer.to_x509_name()?;
    let spki = SubjectPublicKeyInfoOwned::from_der(&subject_key.to_der())?;

    let mut extensions = Vec::<Extension>::new();

    let (basic_constraints, key_usage) = match &params.profile {
        CertificateProfile::Authority => (
            BasicConstraints {
                ca: true,
                path_len_constraint: None,
            },
            KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign | KeyUsages::DigitalSignature),
        ),
        CertificateProfile::EndEntity { .. } => (
            BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
            KeyUsage(KeyUsages::DigitalSignature.into()),
        ),
    };
    extensions.push(basic_constraints.to_extension(&subject_name, &extensions)?);
    extensions.push(key_usage.to_extension(&subject_name, &extensions)?);

    if let CertificateProfile::EndEntity {
        ext_key_usage,
        room_binding,
    } = &params.profile
    {
        if !ext_key_usage.is_empty() {
            let eku = ExtendedKeyUsage(ext_key_usage.clone());
            extensions.push(eku.to_extension(&subject_name, &extensions)?);
        }
        if let Some(room_id) = room_binding {
            let binding = DistinguishedName::new()
                .organizational_unit(format!("{ROOM_BINDING_PREFIX}{room_id}"));
            let san = SubjectAltName(vec![GeneralName::DirectoryName(binding.to_x509_name()?)]);
            extensions.push(san.to_extension(&subject_name, &extensions)?);
        }
    }

    let ski = SubjectKeyIdentifier(OctetString::new(key_identifier(
        &subject_key.to_pkcs1_der(),
    ))?);
    extensions.push(ski.to_extension(&subject_name, &extensions)?);

    let aki = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(key_identifier(
            &issuer_key.public_key().to_pkcs1_der(),
        ))?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };
    extensions.push(aki.to_extension(&subject_name, &extensions)?);

    let tbs_certificate = TbsCertificateInner {
        version: Version::V3,
        serial_number,
        signature: signature_alg.clone(),
        issuer: issuer_name,
        validity: Validity {
            not_before: asn1_time(params.not_before)?,
            not_after: asn1_time(params.not_after)?,
        },
        subject: subject_name,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    // Sign the canonical DER encoding of TBSCertificate.
    let tbs_der = tbs_certificate.to_der()?;
    let signature = issuer_key.sign(&tbs_der);

    let certificate = CertificateInner {
        tbs_certificate,
        signature_algorithm: signature_alg,
        signature: BitString::from_bytes(signature.as_bytes())?,
    };
    Ok(certificate.to_der()?)
}
