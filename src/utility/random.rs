// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Secure random value generation
//!
//! High-entropy opaque identifiers (authorization codes, device codes,
//! request URIs, registration tokens) and human-typeable user codes.
//!
//! User codes are drawn by range rejection so every alphabet character is
//! equally likely; reducing a raw byte modulo the alphabet length would
//! skew towards the low end of the alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Default user-code alphabet: upper-case consonants that survive bad
/// handwriting and phone screens (RFC 8628 §6.1 recommendation).
pub const USER_CODE_ALPHABET: &str = "BCDFGHJKLMNPQRSTVWXZ";

/// Generate an opaque, URL-safe token with `bytes` bytes of entropy.
///
/// 32 bytes yields a 43-character base64url string, comfortably above the
/// 128-bit floor RFC 6749 §10.10 sets for authorization codes.
pub fn opaque_token(bytes: usize) -> String {
    let mut raw = vec![0u8; bytes];
    for b in raw.iter_mut() {
        *b = rand::random::<u8>();
    }
    URL_SAFE_NO_PAD.encode(raw)
}

/// Generate a user code of `groups` groups of `group_len` characters drawn
/// uniformly from `alphabet`, joined by `-`.
///
/// # Panics
///
/// Panics if the alphabet is empty or longer than 256 characters (a
/// programmer error; alphabets are configured constants).
pub fn user_code(alphabet: &str, groups: usize, group_len: usize) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    assert!(
        !chars.is_empty() && chars.len() <= 256,
        "user-code alphabet must have 1..=256 characters"
    );
    let len = chars.len();
    // Largest multiple of `len` that fits in a byte; bytes at or above it
    // are rejected so the remainder below stays uniform.
    let limit = (256 / len) * len;

    let mut out = String::with_capacity(groups * (group_len + 1));
    for g in 0..groups {
        if g > 0 {
            out.push('-');
        }
        for _ in 0..group_len {
            let idx = loop {
                let b = rand::random::<u8>() as usize;
                if b < limit {
                    break b % len;
                }
            };
            out.push(chars[idx]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn opaque_tokens_are_unique_and_urlsafe() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = opaque_token(32);
            assert_eq!(token.len(), 43);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn user_codes_use_only_the_alphabet() {
        let code = user_code(USER_CODE_ALPHABET, 2, 4);
        assert_eq!(code.len(), 9);
        for c in code.chars() {
            assert!(c == '-' || USER_CODE_ALPHABET.contains(c), "bad char {c}");
        }
    }

    #[test]
    fn every_alphabet_character_is_reachable() {
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            for c in user_code(USER_CODE_ALPHABET, 1, 8).chars() {
                if c != '-' {
                    seen.insert(c);
                }
            }
        }
        assert_eq!(seen.len(), USER_CODE_ALPHABET.chars().count());
    }
}
