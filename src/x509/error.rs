// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use thiserror::Error;

/// Result type used by x509 APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by x509 build and parse APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid PrintableString characters")]
    InvalidPrintableString,
    #[error("invalid IA5String characters")]
    InvalidIa5String,
    #[error("subject DN must not be empty")]
    EmptySubjectDn,
    #[error("issuer DN must not be empty")]
    EmptyIssuerDn,
    #[error("invalid validity window: not_before must be < not_after")]
    InvalidValidityWindow,
    #[error("invalid serial number encoding")]
    InvalidSerial,
    #[error("DER encoding error: {0}")]
    Der(#[from] der::Error),
    #[error("structure parse error: {details}")]
    Parse { details: String },
    #[error("trailing data after DER structure")]
    TrailingDerData,
    #[error("signature does not verify under the issuer key")]
    SignatureMismatch,
    #[error("unsupported revocation reason code {code}")]
    UnsupportedReasonCode { code: u8 },
    #[error("unsupported revocation reason {name:?}")]
    UnsupportedReasonName { name: String },
    #[error("timestamp predates the UNIX epoch")]
    PreUnixTimestamp,
}
