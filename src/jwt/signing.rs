// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Signing key management
//!
//! This module contains functionality for managing signing and verification
//! keys, with support for both symmetric and asymmetric keys.
//!
//! ## Features
//!
//! * Support for symmetric keys (HMAC)
//! * Support for asymmetric RSA key pairs
//! * Support for asymmetric Elliptic Curve (EC) key pairs
//! * Key loading from PEM data in memory
//! * Algorithm validation for key types
//!
//! A [`SigningKey`] is one signing identity: the algorithm, the private
//! encoding key, the matching decoding key and the public JWK published
//! for verifiers. The key `kid` defaults to the RFC 7638 thumbprint of the
//! public JWK.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use super::keys::{ec_public_jwk_from_pem, rsa_public_jwk_from_pem, JsonWebKey, OctKeyParameters};

/// Types of signing keys supported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Symmetric key (HMAC). Suitable algorithms: HS256, HS384, HS512.
    Symmetric,

    /// RSA key pair. Suitable algorithms: RS256/384/512, PS256/384/512.
    Rsa,

    /// Elliptic Curve key pair. Suitable algorithms: ES256, ES384.
    ///
    /// Signatures are fixed-length `R ‖ S` concatenations: 64 bytes on
    /// P-256, 96 bytes on P-384.
    Ec,
}

/// A key usable for verifying compact JWS signatures.
pub struct VerificationKey {
    /// `kid` the key was published under, if any.
    pub kid: Option<String>,

    /// Algorithm the signature must have been produced with.
    pub algorithm: Algorithm,

    /// The decoding key.
    pub key: DecodingKey,
}

impl Clone for VerificationKey {
    fn clone(&self) -> Self {
        Self {
            kid: self.kid.clone(),
            algorithm: self.algorithm,
            key: self.key.clone(),
        }
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("key", &"<DecodingKey>")
            .finish()
    }
}

/// One signing identity of the server.
pub struct SigningKey {
    /// Key identifier stamped into JWS headers and published in the JWKS.
    pub kid: String,

    /// Algorithm this key signs with.
    pub algorithm: Algorithm,

    /// Key type.
    pub key_type: KeyType,

    /// Encoding key for signing tokens.
    pub encoding_key: EncodingKey,

    /// Decoding key for verifying tokens signed by this key.
    pub decoding_key: DecodingKey,

    /// Public JWK (private components absent), `None` for symmetric keys
    /// which are never published.
    pub public_jwk: Option<JsonWebKey>,
}

/// Custom debug implementation that hides sensitive key material.
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .field("encoding_key", &"<EncodingKey>")
            .field("decoding_key", &"<DecodingKey>")
            .finish()
    }
}

impl SigningKey {
    /// Create a signing key with a symmetric HMAC secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not an HMAC algorithm.
    pub fn new_symmetric(secret: &[u8], algorithm: &str) -> Result<Self> {
        let algorithm = parse_algorithm(algorithm)?;
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => (),
            _ => {
                return Err(anyhow!(
                    "Algorithm {:?} is not valid for symmetric keys",
                    algorithm
                ))
            }
        }

        let jwk = JsonWebKey::Oct(OctKeyParameters {
            alg: Some(format!("{algorithm:?}")),
            k: URL_SAFE_NO_PAD.encode(secret),
            ..Default::default()
        });
        Ok(Self {
            kid: jwk.thumbprint(),
            algorithm,
            key_type: KeyType::Symmetric,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            public_jwk: None,
        })
    }

    /// Create a signing key from RSA PEM data.
    ///
    /// # Arguments
    ///
    /// * `private_key` - RSA private key in PEM format
    /// * `public_key` - RSA public key in PEM format
    /// * `algorithm` - one of RS256/384/512, PS256/384/512
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not an RSA algorithm or either
    /// key fails to parse.
    pub fn new_rsa_from_pem(
        private_key: &[u8],
        public_key: &[u8],
        algorithm: &str,
    ) -> Result<Self> {
        let algorithm = parse_algorithm(algorithm)?;
        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => (),
            _ => {
                return Err(anyhow!(
                    "Algorithm {:?} is not valid for RSA keys",
                    algorithm
                ))
            }
        }

        let jwk = rsa_public_jwk_from_pem(public_key, &format!("{algorithm:?}"))?;
        Ok(Self {
            kid: jwk.kid().expect("fresh RSA JWK carries a kid").to_string(),
            algorithm,
            key_type: KeyType::Rsa,
            encoding_key: EncodingKey::from_rsa_pem(private_key)?,
            decoding_key: DecodingKey::from_rsa_pem(public_key)?,
            public_jwk: Some(jwk),
        })
    }

    /// Create a signing key from EC PEM data.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not ES256/ES384 (P-521 is not
    /// supported by the signing backend) or either key fails to parse.
    pub fn new_ec_from_pem(private_key: &[u8], public_key: &[u8], algorithm: &str) -> Result<Self> {
        let algorithm = parse_algorithm(algorithm)?;
        match algorithm {
            Algorithm::ES256 | Algorithm::ES384 => (),
            _ => {
                return Err(anyhow!(
                    "Algorithm {:?} is not valid for EC keys",
                    algorithm
                ))
            }
        }

        let jwk = ec_public_jwk_from_pem(public_key, &format!("{algorithm:?}"))?;
        Ok(Self {
            kid: jwk.kid().expect("fresh EC JWK carries a kid").to_string(),
            algorithm,
            key_type: KeyType::Ec,
            encoding_key: EncodingKey::from_ec_pem(private_key)?,
            decoding_key: DecodingKey::from_ec_pem(public_key)?,
            public_jwk: Some(jwk),
        })
    }

    /// Override the key identifier.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        if let Some(jwk) = &mut self.public_jwk {
            jwk.set_kid(self.kid.clone());
        }
        self
    }

    /// Verification keys for tokens signed by this key.
    pub fn verification_keys(&self) -> Vec<VerificationKey> {
        vec![VerificationKey {
            kid: Some(self.kid.clone()),
            algorithm: self.algorithm,
            key: self.decoding_key.clone(),
        }]
    }

    /// Canonical name of the signing algorithm (`RS256`, ...).
    pub fn algorithm_name(&self) -> String {
        format!("{:?}", self.algorithm)
    }
}

/// Parse a JWS algorithm name, rejecting `none` and unsupported values.
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    if name.eq_ignore_ascii_case("none") {
        return Err(anyhow!("The \"none\" algorithm is not acceptable"));
    }
    name.parse::<Algorithm>()
        .map_err(|_| anyhow!("Unsupported JWS algorithm {:?}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_key_rejects_rsa_algorithm() {
        assert!(SigningKey::new_symmetric(b"secret", "RS256").is_err());
    }

    #[test]
    fn none_algorithm_is_rejected() {
        assert!(parse_algorithm("none").is_err());
        assert!(parse_algorithm("NONE").is_err());
    }

    #[test]
    fn es512_is_rejected_at_key_load() {
        let err = SigningKey::new_ec_from_pem(b"-", b"-", "ES512").unwrap_err();
        assert!(err.to_string().contains("ES512"), "{err}");
    }

    #[test]
    fn symmetric_keys_are_not_published() {
        let key = SigningKey::new_symmetric(b"0123456789abcdef", "HS256").unwrap();
        assert!(key.public_jwk.is_none());
        assert_eq!(key.key_type, KeyType::Symmetric);
    }
}
