// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Signature verification over canonical challenge bytes.

use crate::challenge::Challenge;
use crate::rsa;

/// Signature verification failures.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature does not verify")]
    VerifyFailed,
    #[error("signature is not valid hex")]
    MalformedSignature,
}

/// Verifies a client signature over the canonical bytes of `challenge`
/// using the public key extracted from its certificate.
pub fn verify_challenge(
    public_key: &rsa::PublicKey,
    challenge: &Challenge,
    signature_hex: &str,
) -> Result<(), SignatureError> {
    verify_bytes(public_key, &challenge.canonical_bytes(), signature_hex)
}

/// Generic form: verifies a hex signature over arbitrary bytes. Used by
/// the attendance recorder for offline record checks.
pub fn verify_bytes(
    public_key: &rsa::PublicKey,
    bytes: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let signature =
        rsa::Signature::from_hex(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;
    public_key
        .verify(bytes, &signature)
        .map_err(|_| SignatureError::VerifyFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeRegistry;
    use crate::store::Deadline;
    use chrono::{Duration, TimeZone, Utc};

    fn signed_challenge() -> (rsa::SecretKey, Challenge) {
        let key = rsa::SecretKey::generate(2048).unwrap();
        let registry = ChallengeRegistry::new(Duration::seconds(30), Duration::seconds(300));
        let challenge = registry
            .generate(
                "ab01",
                "CS101",
                "door_001",
                "aa00",
                Utc.with_ymd_and_hms(2026, 4, 1, 10, 30, 0).unwrap(),
                Deadline::none(),
            )
            .unwrap();
        (key, challenge)
    }

    #[test]
    fn test_verify_challenge_accepts_holder_signature() {
        let (key, challenge) = signed_challenge();
        let sig = key.sign(&challenge.canonical_bytes());
        verify_challenge(&key.public_key(), &challenge, &sig.to_hex()).unwrap();
    }

    #[test]
    fn test_verify_challenge_rejects_wrong_key() {
        let (key, challenge) = signed_challenge();
        let sig = key.sign(&challenge.canonical_bytes());
        let other = rsa::SecretKey::generate(2048).unwrap();
        assert!(matches!(
            verify_challenge(&other.public_key(), &challenge, &sig.to_hex()),
            Err(SignatureError::VerifyFailed)
        ));
    }

    #[test]
    fn test_verify_challenge_rejects_bit_flip() {
        let (key, challenge) = signed_challenge();
        let mut sig_bytes = key.sign(&challenge.canonical_bytes()).as_bytes().to_vec();
        sig_bytes[10] ^= 0x01;
        let flipped = hex::encode(sig_bytes);
        assert!(matches!(
            verify_challenge(&key.public_key(), &challenge, &flipped),
            Err(SignatureError::VerifyFailed)
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_hex() {
        let (key, challenge) = signed_challenge();
        assert!(matches!(
            verify_challenge(&key.public_key(), &challenge, "zz-not-hex"),
            Err(SignatureError::MalformedSignature)
        ));
    }
}
