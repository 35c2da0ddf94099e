// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! RSA signing and verification wrappers.
//!
//! All signatures in the system are PKCS#1 v1.5 over SHA-256
//! (https://datatracker.ietf.org/doc/html/rfc8017). Private keys travel
//! as PKCS#8, public keys as SPKI, both PEM-wrapped at the boundary.

use crate::pem::{self, PemError};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::sha2::Sha256;
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

/// Smallest accepted RSA modulus, in bits.
pub const MIN_KEY_BITS: usize = 2048;

/// Largest accepted RSA modulus, in bits.
pub const MAX_KEY_BITS: usize = 4096;

/// Errors from the crypto facade. Every failure mode on bad input is
/// total: no operation leaves partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed key, certificate or signature encoding")]
    BadEncoding,
    #[error("key is not an acceptable RSA signing key")]
    WrongKeyType,
    #[error("signature verification failed")]
    VerifyFailed,
}

impl From<PemError> for CryptoError {
    fn from(_: PemError) -> Self {
        CryptoError::BadEncoding
    }
}

/// Checks the key-shape policy shared by all parse paths: modulus within
/// the accepted range and the ubiquitous F4 public exponent. Every modern
/// deployment fixes e = 65537, so anything else is rejected outright.
fn check_key_shape(n_bits: usize, e: &BigUint) -> Result<(), CryptoError> {
    if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&n_bits) {
        return Err(CryptoError::WrongKeyType);
    }
    if *e != BigUint::from(65537u32) {
        return Err(CryptoError::WrongKeyType);
    }
    Ok(())
}

/// SecretKey is an RSA private key usable for PKCS#1 v1.5 / SHA-256
/// signing. Encryption is deliberately not exposed; nothing in the
/// protocol needs it.
#[derive(Clone)]
pub struct SecretKey {
    inner: rsa::pkcs1v15::SigningKey<Sha256>,
}

impl SecretKey {
    /// Generates a new private key with a `bits`-sized modulus.
    pub fn generate(bits: usize) -> Result<SecretKey, CryptoError> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
            return Err(CryptoError::WrongKeyType);
        }
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, bits).map_err(|_| CryptoError::WrongKeyType)?;
        Ok(Self {
            inner: rsa::pkcs1v15::SigningKey::<Sha256>::new(key),
        })
    }

    /// Parses a PKCS#8 DER buffer into a private key.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner = rsa::pkcs1v15::SigningKey::<Sha256>::from_pkcs8_der(der)
            .map_err(|_| CryptoError::BadEncoding)?;
        let key: &RsaPrivateKey = inner.as_ref();
        check_key_shape(key.n().bits(), key.e())?;
        Ok(Self { inner })
    }

    /// Parses a `PRIVATE KEY` PEM block into a private key.
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let der = pem::decode_labeled(pem_str, "PRIVATE KEY")?;
        Self::from_der(&der)
    }

    /// Serializes the private key as PKCS#8 DER.
    pub fn to_der(&self) -> Vec<u8> {
        rsa::pkcs1v15::SigningKey::<Sha256>::to_pkcs8_der(&self.inner)
            .expect("PKCS#8 encoding of a generated key cannot fail")
            .as_bytes()
            .to_vec()
    }

    /// Serializes the private key as a `PRIVATE KEY` PEM block.
    pub fn to_pem(&self) -> String {
        pem::encode("PRIVATE KEY", &self.to_der())
    }

    /// Retrieves the public counterpart of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Creates a PKCS#1 v1.5 / SHA-256 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.inner.sign(message).to_bytes().as_ref().to_vec())
    }
}

impl std::fmt::Debug for SecretKey {
    // Never print private material, not even accidentally via Debug.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// PublicKey is an RSA public key usable for PKCS#1 v1.5 / SHA-256
/// signature verification.
#[derive(Debug, Clone)]
pub struct PublicKey {
    inner: rsa::pkcs1v15::VerifyingKey<Sha256>,
}

impl PublicKey {
    /// Parses an SPKI DER buffer into a public key.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner = rsa::pkcs1v15::VerifyingKey::<Sha256>::from_public_key_der(der)
            .map_err(|_| CryptoError::WrongKeyType)?;
        let key: &RsaPublicKey = inner.as_ref();
        check_key_shape(key.n().bits(), key.e())?;
        Ok(Self { inner })
    }

    /// Parses a `PUBLIC KEY` PEM block into a public key.
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let der = pem::decode_labeled(pem_str, "PUBLIC KEY")?;
        Self::from_der(&der)
    }

    /// Serializes the public key as SPKI DER.
    pub fn to_der(&self) -> Vec<u8> {
        rsa::pkcs1v15::VerifyingKey::<Sha256>::to_public_key_der(&self.inner)
            .expect("SPKI encoding of a valid key cannot fail")
            .as_bytes()
            .to_vec()
    }

    /// Serializes the public key as a `PUBLIC KEY` PEM block.
    pub fn to_pem(&self) -> String {
        pem::encode("PUBLIC KEY", &self.to_der())
    }

    /// Serializes the bare RSAPublicKey (PKCS#1 DER). This is the
    /// subjectPublicKey BIT STRING payload, which key identifiers hash.
    pub fn to_pkcs1_der(&self) -> Vec<u8> {
        let key: &RsaPublicKey = self.inner.as_ref();
        key.to_pkcs1_der()
            .expect("PKCS#1 encoding of a valid key cannot fail")
            .as_bytes()
            .to_vec()
    }

    /// Verifies a PKCS#1 v1.5 / SHA-256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = rsa::pkcs1v15::Signature::try_from(signature.as_bytes())
            .map_err(|_| CryptoError::BadEncoding)?;
        self.inner
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerifyFailed)
    }
}

/// Signature holds a raw RSA signature; its length tracks the modulus of
/// the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wraps raw signature bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Decodes a signature from its boundary hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str).map_err(|_| CryptoError::BadEncoding)?;
        if bytes.is_empty() {
            return Err(CryptoError::BadEncoding);
        }
        Ok(Self(bytes))
    }

    /// Encodes the signature into its boundary hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let secret = SecretKey::generate(2048).unwrap();
        let public = secret.public_key();

        let message = b"challenge bytes to authenticate";
        let signature = secret.sign(message);
        public.verify(message, &signature).unwrap();
    }

    #[test]
    fn test_verify_rejects_bit_flips() {
        let secret = SecretKey::generate(2048).unwrap();
        let public = secret.public_key();

        let message = b"tamper detection probe";
        let signature = secret.sign(message);

        let mut mutated = message.to_vec();
        mutated[0] ^= 0x01;
        assert!(matches!(
            public.verify(&mutated, &signature),
            Err(CryptoError::VerifyFailed)
        ));

        let mut sig_bytes = signature.as_bytes().to_vec();
        sig_bytes[0] ^= 0x01;
        assert!(matches!(
            public.verify(message, &Signature::from_bytes(&sig_bytes)),
            Err(CryptoError::VerifyFailed)
        ));
    }

    #[test]
    fn test_private_key_pem_roundtrip() {
        let secret = SecretKey::generate(2048).unwrap();
        let pem = secret.to_pem();
        let reparsed = SecretKey::from_pem(&pem).unwrap();
        assert_eq!(reparsed.to_der(), secret.to_der());
    }

    #[test]
    fn test_public_key_pem_roundtrip() {
        let public = SecretKey::generate(2048).unwrap().public_key();
        let pem = public.to_pem();
        let reparsed = PublicKey::from_pem(&pem).unwrap();
        assert_eq!(reparsed.to_der(), public.to_der());
    }

    #[test]
    fn test_generate_rejects_weak_bits() {
        assert!(matches!(
            SecretKey::generate(1024),
            Err(CryptoError::WrongKeyType)
        ));
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let sig = Signature::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(sig.to_hex(), "deadbeef");
        assert_eq!(Signature::from_hex("deadbeef").unwrap(), sig);
        assert!(Signature::from_hex("not-hex").is_err());
        assert!(Signature::from_hex("").is_err());
    }

    // PKCS#1 v1.5 is a deterministic scheme; two signatures over the
    // same bytes must be identical.
    #[test]
    fn test_signature_is_deterministic() {
        let secret = SecretKey::generate(2048).unwrap();
        let message = b"determinism probe";
        assert_eq!(secret.sign(message), secret.sign(message));
    }
}
