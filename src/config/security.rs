// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Signing key configuration
//!
//! Key material for the token signer. Keys are supplied as Base64-encoded
//! PEM documents, the same representation the `rs256keygen` binary emits.

use serde::{Deserialize, Serialize};

/// A single configured signing key.
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningKeyEntry {
    /// Key identifier published in the JWKS and stamped into JWS headers.
    ///
    /// When omitted, the RFC 7638 thumbprint of the public key is used.
    #[serde(default)]
    pub kid: Option<String>,

    /// JWS algorithm this key signs with (`RS256`, `PS256`, `ES256`, ...).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Private key in PEM format, Base64 encoded.
    pub private_key: String,

    /// Public key in PEM format, Base64 encoded.
    pub public_key: String,

    /// Whether this key is the active signer for its algorithm.
    ///
    /// Inactive keys stay published in the JWKS so tokens signed before a
    /// rotation keep verifying until they expire.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Custom debug implementation that hides the private key material.
impl std::fmt::Debug for SigningKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyEntry")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("private_key", &"<private key>")
            .field("public_key", &"<public key>")
            .field("active", &self.active)
            .finish()
    }
}

/// Key material configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Signing keys. The first active entry per algorithm signs new tokens;
    /// every entry is published for verification.
    #[serde(default)]
    pub keys: Vec<SigningKeyEntry>,

    /// Cache duration in seconds for remote JWKS documents (client
    /// registered `jwks_uri` values and trusted assertion issuers).
    #[serde(default = "default_jwks_cache")]
    pub jwks_cache_duration: u64,

    /// Salt mixed into pairwise subject identifier derivation.
    ///
    /// Must stay stable across restarts: a changed salt silently changes
    /// the `sub` every pairwise client sees. When absent a random salt is
    /// generated at startup and a warning is logged; suitable for
    /// development only.
    #[serde(default)]
    pub pairwise_salt: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            jwks_cache_duration: default_jwks_cache(),
            pairwise_salt: None,
        }
    }
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_active() -> bool {
    true
}

fn default_jwks_cache() -> u64 {
    300
}
