// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # JWT library
//!
//! Creation and validation of signed compact-serialized tokens over a claim
//! set, plus the JWK/JWKS model published by the discovery surface.
//!
//! ## Features
//!
//! * Symmetric (HMAC) and asymmetric (RSA, EC) signing keys
//! * `RS256/384/512`, `PS256/384/512`, `ES256/384`, `HS256/384/512`
//! * kty-polymorphic [`JsonWebKey`] with private-component stripping
//! * Structured validation errors instead of a single opaque failure
//! * Remote JWKS fetching with TTL caching and request coalescing
//!
//! ## Architecture
//!
//! - [`SigningKey`]: algorithm + key material for one signing identity
//! - [`TokenSigner`]: stamps registered claims and produces compact JWS
//! - [`TokenValidator`]: resolves the verification key by `kid`, checks the
//!   signature and the registered claims
//! - [`JwksClient`]: SSRF-guarded remote JWKS retrieval
//!
//! ECDSA signatures are produced and consumed in the fixed-length
//! IEEE P-1363 `R ‖ S` form JOSE requires (64 bytes for P-256, 96 for
//! P-384), not ASN.1/DER.
//!
//! ## Example
//!
//! ```rust
//! use rust_oidc_server::jwt::{ClaimSet, SigningKey, TokenSigner, TokenValidator};
//! use rust_oidc_server::utility::SystemClock;
//! use std::sync::Arc;
//!
//! let key = SigningKey::new_symmetric(b"0123456789abcdef0123456789abcdef", "HS256").unwrap();
//! let signer = TokenSigner::new("https://auth.example.com", Arc::new(SystemClock));
//!
//! let mut claims = ClaimSet::new();
//! claims.set_str("sub", "user-1");
//! claims.set_i64("exp", chrono::Utc::now().timestamp() + 60);
//! let token = signer.sign(claims, &key).unwrap();
//!
//! let validator = TokenValidator::new(Arc::new(SystemClock))
//!     .with_issuer("https://auth.example.com");
//! let verified = validator.validate(&token, &key.verification_keys()).unwrap();
//! assert_eq!(verified.claims.sub(), Some("user-1"));
//! ```

pub mod claims;
pub mod jwks_client;
pub mod keys;
pub mod signing;
pub mod validator;

mod issuer;

pub use claims::ClaimSet;
pub use issuer::TokenSigner;
pub use jwks_client::JwksClient;
pub use keys::{JsonWebKey, JwkKeySet};
pub use signing::{KeyType, SigningKey, VerificationKey};
pub use validator::{TokenValidationError, TokenValidator, VerifiedToken};
