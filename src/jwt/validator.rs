// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Token validation
//!
//! Parses `header.payload.signature`, resolves the verification key by
//! `kid` (or, absent a `kid`, tries every key of the matching algorithm),
//! checks the signature and then the registered claims against the clock.
//!
//! Every failure maps onto a dedicated [`TokenValidationError`] variant so
//! callers can distinguish an expired token from a key mismatch without
//! string matching. `alg: none` tokens never reach signature verification:
//! the header fails to parse into a known algorithm.

use jsonwebtoken::{Algorithm, Header, Validation};
use std::sync::Arc;
use thiserror::Error;

use super::claims::ClaimSet;
use super::signing::VerificationKey;
use crate::utility::Clock;

/// Structured validation failures.
#[derive(Debug, Error)]
pub enum TokenValidationError {
    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Token signature does not verify against any candidate key")]
    InvalidSignature,

    #[error("Token issuer {found:?} does not match {expected:?}")]
    InvalidIssuer { expected: String, found: String },

    #[error("Token audience does not include {expected:?}")]
    InvalidAudience { expected: String },

    #[error("Token is malformed: {0}")]
    MalformedToken(String),

    #[error("No verification key matches kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("Token algorithm {found:?} is not acceptable here")]
    AlgorithmMismatch { found: String },
}

/// A successfully validated token.
#[derive(Debug)]
pub struct VerifiedToken {
    /// Parsed JOSE header.
    pub header: Header,

    /// Parsed payload.
    pub claims: ClaimSet,
}

/// Validator for compact JWS tokens.
///
/// Construction is cheap; handlers build one per expectation set.
pub struct TokenValidator {
    clock: Arc<dyn Clock>,
    expected_issuer: Option<String>,
    expected_audience: Option<String>,
    allowed_algorithms: Option<Vec<Algorithm>>,
    leeway: i64,
    require_exp: bool,
}

impl TokenValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            expected_issuer: None,
            expected_audience: None,
            allowed_algorithms: None,
            leeway: 60,
            require_exp: true,
        }
    }

    /// Require `iss` to equal `issuer`.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Require `aud` to include `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Restrict the acceptable header algorithms.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = Some(algorithms);
        self
    }

    /// Clock skew tolerated on `nbf` and `iat` (seconds, default 60).
    pub fn with_leeway(mut self, leeway: i64) -> Self {
        self.leeway = leeway;
        self
    }

    /// Accept tokens without an `exp` claim.
    pub fn allow_missing_exp(mut self) -> Self {
        self.require_exp = false;
        self
    }

    /// Validate `token` against `keys`.
    pub fn validate(
        &self,
        token: &str,
        keys: &[VerificationKey],
    ) -> Result<VerifiedToken, TokenValidationError> {
        let verified = self.verify_signature(token, keys)?;
        self.validate_claims(&verified.claims)?;
        Ok(verified)
    }

    /// Signature, key resolution and issuer only — no time checks.
    ///
    /// Revocation uses this: an expired token must still be recognizable
    /// as ours.
    pub fn validate_signature_only(
        &self,
        token: &str,
        keys: &[VerificationKey],
    ) -> Result<VerifiedToken, TokenValidationError> {
        let verified = self.verify_signature(token, keys)?;
        if let Some(expected) = &self.expected_issuer {
            let found = verified.claims.iss().unwrap_or_default();
            if found != expected {
                return Err(TokenValidationError::InvalidIssuer {
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }
        Ok(verified)
    }

    fn verify_signature(
        &self,
        token: &str,
        keys: &[VerificationKey],
    ) -> Result<VerifiedToken, TokenValidationError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| TokenValidationError::MalformedToken(e.to_string()))?;

        if let Some(allowed) = &self.allowed_algorithms {
            if !allowed.contains(&header.alg) {
                return Err(TokenValidationError::AlgorithmMismatch {
                    found: format!("{:?}", header.alg),
                });
            }
        }

        // Resolve candidate keys: exact kid match when the header names one,
        // otherwise every key of the header's algorithm.
        let candidates: Vec<&VerificationKey> = match &header.kid {
            Some(kid) => keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid.as_str()))
                .collect(),
            None => keys.iter().filter(|k| k.algorithm == header.alg).collect(),
        };
        if candidates.is_empty() {
            return Err(TokenValidationError::UnknownKey(header.kid.clone()));
        }

        let mut verified: Option<ClaimSet> = None;
        for candidate in candidates {
            if candidate.algorithm != header.alg {
                return Err(TokenValidationError::AlgorithmMismatch {
                    found: format!("{:?}", header.alg),
                });
            }
            // Signature check only; registered claims are validated below
            // against the injected clock.
            let mut validation = Validation::new(header.alg);
            validation.validate_exp = false;
            validation.validate_nbf = false;
            validation.validate_aud = false;
            validation.required_spec_claims.clear();

            match jsonwebtoken::decode::<ClaimSet>(token, &candidate.key, &validation) {
                Ok(data) => {
                    verified = Some(data.claims);
                    break;
                }
                Err(_) => continue,
            }
        }
        let claims = verified.ok_or(TokenValidationError::InvalidSignature)?;
        Ok(VerifiedToken { header, claims })
    }

    /// Registered-claim checks shared by every token family.
    fn validate_claims(&self, claims: &ClaimSet) -> Result<(), TokenValidationError> {
        let now = self.clock.now_ts();

        match claims.exp() {
            Some(exp) => {
                if exp <= now {
                    return Err(TokenValidationError::TokenExpired);
                }
            }
            None if self.require_exp => {
                return Err(TokenValidationError::MalformedToken(
                    "Missing exp claim".to_string(),
                ))
            }
            None => {}
        }

        if let Some(nbf) = claims.nbf() {
            if nbf > now + self.leeway {
                return Err(TokenValidationError::TokenNotYetValid);
            }
        }

        if let Some(iat) = claims.iat() {
            if iat > now + self.leeway {
                return Err(TokenValidationError::TokenNotYetValid);
            }
        }

        if let Some(expected) = &self.expected_issuer {
            let found = claims.iss().unwrap_or_default();
            if found != expected {
                return Err(TokenValidationError::InvalidIssuer {
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }

        if let Some(expected) = &self.expected_audience {
            if !claims.aud().iter().any(|a| a == expected) {
                return Err(TokenValidationError::InvalidAudience {
                    expected: expected.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{SigningKey, TokenSigner};
    use crate::utility::{Clock as _, ManualClock, SystemClock};

    fn hs_key() -> SigningKey {
        SigningKey::new_symmetric(b"0123456789abcdef0123456789abcdef", "HS256").unwrap()
    }

    fn signed(claims: ClaimSet) -> String {
        let signer = TokenSigner::new("https://auth.example.com", Arc::new(SystemClock));
        signer.sign(claims, &hs_key()).unwrap()
    }

    #[test]
    fn valid_token_passes() {
        let mut claims = ClaimSet::new();
        claims.set_i64("exp", SystemClock.now_ts() + 120);
        claims.set_str("sub", "user-1");
        let token = signed(claims);

        let validator =
            TokenValidator::new(Arc::new(SystemClock)).with_issuer("https://auth.example.com");
        let verified = validator.validate(&token, &hs_key().verification_keys()).unwrap();
        assert_eq!(verified.claims.sub(), Some("user-1"));
    }

    #[test]
    fn expired_token_is_structured_error() {
        let clock = ManualClock::new(chrono::Utc::now());
        let mut claims = ClaimSet::new();
        claims.set_i64("exp", clock.now_ts() + 30);
        let token = signed(claims);

        clock.advance(31);
        let validator = TokenValidator::new(Arc::new(clock));
        let err = validator
            .validate(&token, &hs_key().verification_keys())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::TokenExpired));
    }

    #[test]
    fn tampered_token_fails_signature() {
        let mut claims = ClaimSet::new();
        claims.set_i64("exp", SystemClock.now_ts() + 120);
        let mut token = signed(claims);
        token.replace_range(token.len() - 4.., "AAAA");

        let validator = TokenValidator::new(Arc::new(SystemClock));
        let err = validator
            .validate(&token, &hs_key().verification_keys())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::InvalidSignature));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let mut claims = ClaimSet::new();
        claims.set_i64("exp", SystemClock.now_ts() + 120);
        claims.set_aud(&["other-api".to_string()]);
        let token = signed(claims);

        let validator = TokenValidator::new(Arc::new(SystemClock)).with_audience("my-api");
        let err = validator
            .validate(&token, &hs_key().verification_keys())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::InvalidAudience { .. }));
    }

    #[test]
    fn unknown_kid_is_reported() {
        let mut claims = ClaimSet::new();
        claims.set_i64("exp", SystemClock.now_ts() + 120);
        let token = signed(claims);

        let mut other = hs_key().verification_keys();
        other[0].kid = Some("some-other-kid".to_string());
        let validator = TokenValidator::new(Arc::new(SystemClock));
        let err = validator.validate(&token, &other).unwrap_err();
        assert!(matches!(err, TokenValidationError::UnknownKey(_)));
    }

    #[test]
    fn alg_none_is_malformed() {
        // {"alg":"none","typ":"JWT"} . {} . empty signature
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.e30.";
        let validator = TokenValidator::new(Arc::new(SystemClock));
        let err = validator
            .validate(token, &hs_key().verification_keys())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::MalformedToken(_)));
    }
}
