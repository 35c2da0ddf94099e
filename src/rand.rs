// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Randomness for nonces and certificate serials. A 32-byte OS seed is
//! expanded through ChaCha20 per call.

use rand::RngCore;
use rand_chacha::rand_core::SeedableRng;

/// Size of a challenge nonce in bytes (256 bits).
pub const NONCE_SIZE: usize = 32;

/// Size of a certificate serial number in bytes (128 bits).
pub const SERIAL_SIZE: usize = 16;

/// Fills a buffer of `bytes` length with cryptographically secure
/// randomness.
pub fn generate(bytes: usize) -> Vec<u8> {
    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).expect("failed to get random seed");
    let mut rng = rand_chacha::ChaCha20Rng::from_seed(seed);

    let mut buf = vec![0u8; bytes];
    rng.fill_bytes(&mut buf[..]);
    buf
}

/// Draws a fresh 256-bit nonce, hex-encoded as used at every boundary.
pub fn nonce() -> String {
    hex::encode(generate(NONCE_SIZE))
}

/// Draws a random certificate serial number.
///
/// The top bit is cleared so the DER INTEGER encoding stays positive.
/// The leading byte is kept non-zero so the minimal INTEGER encoding is
/// always exactly [`SERIAL_SIZE`] bytes; otherwise the hex form derived
/// from a parsed certificate would not match the issued one.
pub fn serial() -> [u8; SERIAL_SIZE] {
    let mut serial: [u8; SERIAL_SIZE] = generate(SERIAL_SIZE).try_into().unwrap();
    serial[0] &= 0x7F;
    if serial[0] == 0 {
        serial[0] = 0x01;
    }
    serial
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smoke test that the expansion works for assorted sizes; this does
    // not assess the quality of the randomness.
    #[test]
    fn test_generate_sizes() {
        for size in [0, 1, NONCE_SIZE, 33, 4096] {
            assert_eq!(generate(size).len(), size);
        }
    }

    #[test]
    fn test_nonce_is_hex_encoded() {
        let n = nonce();
        assert_eq!(n.len(), NONCE_SIZE * 2);
        assert!(n.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_serial_is_positive_with_full_width() {
        for _ in 0..64 {
            let s = serial();
            assert_eq!(s[0] & 0x80, 0);
            assert_ne!(s[0], 0);
        }
    }
}
