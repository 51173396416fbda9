// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Crypto port: digest, HMAC, constant-time comparison.
//!
//! Everything that touches key material or produces wire-visible digests
//! goes through [`CryptoPort`] so hosts can swap in their own stack (HSM,
//! WebCrypto, …). [`DefaultCrypto`] is the pure-Rust implementation.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Digest algorithms the port understands.
///
/// SHA-1 exists only because legacy host repositories address objects with
/// it; every warp-native digest (state hash, patch id in the memory store,
/// HMAC envelope) is SHA-256.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HashAlgorithm {
    /// SHA-256 (the warp-native digest).
    Sha256,
    /// SHA-1 (legacy host repositories only).
    Sha1,
}

/// Digest, HMAC, and constant-time comparison seam.
pub trait CryptoPort: Send + Sync {
    /// Hex digest of `data` under `algorithm`.
    fn hash_hex(&self, algorithm: HashAlgorithm, data: &[u8]) -> String;

    /// HMAC of `data` under `key`.
    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8>;

    /// Constant-time equality. Unequal lengths compare unequal without
    /// shortcutting on content.
    fn timing_safe_equal(&self, a: &[u8], b: &[u8]) -> bool;
}

/// Pure-Rust [`CryptoPort`] over the RustCrypto stack.
#[derive(Clone, Copy, Default, Debug)]
pub struct DefaultCrypto;

impl CryptoPort for DefaultCrypto {
    fn hash_hex(&self, algorithm: HashAlgorithm, data: &[u8]) -> String {
        match algorithm {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
        }
    }

    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        match algorithm {
            HashAlgorithm::Sha256 => {
                // Hmac::new_from_slice accepts keys of any length.
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha1 => {
                let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key)
                    .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    fn timing_safe_equal(&self, a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            diff |= x ^ y;
        }
        diff == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let crypto = DefaultCrypto;
        assert_eq!(
            crypto.hash_hex(HashAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hmac_sha256_rfc4231_case_2() {
        let crypto = DefaultCrypto;
        let tag = crypto.hmac(
            HashAlgorithm::Sha256,
            b"Jefe",
            b"what do ya want for nothing?",
        );
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn timing_safe_equal_semantics() {
        let crypto = DefaultCrypto;
        assert!(crypto.timing_safe_equal(b"abc", b"abc"));
        assert!(!crypto.timing_safe_equal(b"abc", b"abd"));
        assert!(!crypto.timing_safe_equal(b"abc", b"abcd"));
    }
}
