// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hashing helpers
//!
//! SHA-256/SHA-512 digests plus the protocol-specific derivations built on
//! them: PKCE `S256` challenges (RFC 7636), certificate thumbprints for
//! `cnf.x5t#S256` (RFC 8705) and pairwise subject identifiers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha512};

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// SHA-512 digest of `data`.
pub fn sha512(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// PKCE `S256` code challenge: `base64url(sha256(verifier))`, no padding.
pub fn pkce_challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(sha256(verifier.as_bytes()))
}

/// Certificate thumbprint for `cnf.x5t#S256`: `base64url(sha256(der))`.
pub fn x5t_s256(der: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(sha256(der))
}

/// OIDC half hash (`at_hash` / `c_hash`): base64url of the left half of
/// the SHA-256 digest, for tokens signed with a SHA-256 algorithm.
pub fn half_hash_s256(value: &str) -> String {
    let digest = sha256(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Pairwise subject identifier: `base64url(sha256(sector || sub || salt))`.
pub fn pairwise_subject(sector: &str, local_sub: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sector.as_bytes());
    hasher.update(local_sub.as_bytes());
    hasher.update(salt.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// FIPS 180-2 test vector.
    #[test]
    fn sha256_abc_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    /// RFC 7636 appendix B reference pair.
    #[test]
    fn pkce_s256_reference_vector() {
        assert_eq!(
            pkce_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn pairwise_subjects_differ_per_sector() {
        let a = pairwise_subject("app-a.example.com", "user-1", "salt");
        let b = pairwise_subject("app-b.example.com", "user-1", "salt");
        assert_ne!(a, b);
    }
}
