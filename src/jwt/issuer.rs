// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Token signer
//!
//! Stamps the registered claims the server is responsible for (`iss`,
//! `iat`, `jti`) and produces the compact JWS serialization.

use anyhow::{Context as _, Result};
use jsonwebtoken::Header;
use std::sync::Arc;

use super::claims::ClaimSet;
use super::signing::SigningKey;
use crate::utility::Clock;

/// Produces signed tokens on behalf of the issuer.
pub struct TokenSigner {
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    pub fn new(issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            clock,
        }
    }

    /// The issuer identifier stamped into `iss`.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `claims` with `key`.
    ///
    /// `iss` and `iat` are set unconditionally; `jti` only when absent so
    /// callers controlling the token identity (refresh rotation, logout
    /// tokens) keep theirs.
    pub fn sign(&self, mut claims: ClaimSet, key: &SigningKey) -> Result<String> {
        claims.set_str("iss", self.issuer.clone());
        claims.set_i64("iat", self.clock.now_ts());
        claims.set_default("jti", serde_json::Value::String(uuid::Uuid::new_v4().to_string()));

        let mut header = Header::new(key.algorithm);
        header.kid = Some(key.kid.clone());

        jsonwebtoken::encode(&header, &claims, &key.encoding_key)
            .context("Failed to sign token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::{Clock as _, SystemClock};

    #[test]
    fn stamps_iss_iat_and_jti() {
        let key = SigningKey::new_symmetric(b"0123456789abcdef0123456789abcdef", "HS256").unwrap();
        let signer = TokenSigner::new("https://auth.example.com", Arc::new(SystemClock));

        let mut claims = ClaimSet::new();
        claims.set_i64("exp", SystemClock.now_ts() + 60);
        let token = signer.sign(claims, &key).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(payload["iss"], "https://auth.example.com");
        assert!(payload["iat"].is_i64());
        assert!(payload["jti"].is_string());
    }

    #[test]
    fn existing_jti_is_preserved() {
        let key = SigningKey::new_symmetric(b"0123456789abcdef0123456789abcdef", "HS256").unwrap();
        let signer = TokenSigner::new("https://auth.example.com", Arc::new(SystemClock));

        let mut claims = ClaimSet::new();
        claims.set_str("jti", "fixed-jti");
        claims.set_i64("exp", SystemClock.now_ts() + 60);
        let token = signer.sign(claims, &key).unwrap();

        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let payload: serde_json::Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(token.split('.').nth(1).unwrap())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(payload["jti"], "fixed-jti");
    }
}
