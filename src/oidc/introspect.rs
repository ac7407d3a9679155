// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # OAuth 2.0 Token Introspection
//!
//! This module implements RFC 7662 OAuth 2.0 Token Introspection, providing
//! functionality to validate tokens and retrieve metadata about them.
//!
//! The endpoint authenticates the caller first. An active token belonging
//! to the caller yields its metadata plus `"active": true`; every other
//! case — unknown token, expired, revoked, rotated out, or a token that
//! belongs to another client — yields `{ "active": false }` and nothing
//! else, so the endpoint cannot be used as an oracle.
//!
//! ## References
//!
//! * [RFC 7662: OAuth 2.0 Token Introspection](https://datatracker.ietf.org/doc/html/rfc7662)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client_auth::{authenticate_client, ClientRequest};
use super::error::OidcError;
use super::OidcState;
use crate::jwt::TokenValidator;

/// Token introspection response according to RFC 7662.
///
/// The `active` field is always present; all other fields are only
/// included when the token is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Is the token active?
    pub active: bool,

    /// Scope of the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Subject of the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,

    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Token identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Token type (bearer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Confirmation claim of sender-constrained tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<serde_json::Value>,
}

impl IntrospectionResponse {
    /// The response for every inactive case.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            exp: None,
            iat: None,
            nbf: None,
            aud: None,
            iss: None,
            jti: None,
            token_type: None,
            cnf: None,
        }
    }
}

/// Handle an introspection request.
///
/// Only the client authentication failure is an error; every problem with
/// the presented token degrades to `active: false`.
pub async fn handle_introspection(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<IntrospectionResponse, OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;

    let Some(token) = form.get("token") else {
        return Ok(IntrospectionResponse::inactive());
    };

    let validator = TokenValidator::new(state.clock.clone()).with_issuer(state.issuer());
    let verified = match validator.validate(token, &state.keys.verification_keys()) {
        Ok(verified) => verified,
        Err(_) => return Ok(IntrospectionResponse::inactive()),
    };
    let claims = verified.claims;

    // Registry status: revoked and rotated-out tokens introspect inactive
    // until their natural expiry.
    if let Some(jti) = claims.jti() {
        if !state.tokens.is_active(jti).await {
            return Ok(IntrospectionResponse::inactive());
        }
    }

    // A client may only look at its own tokens.
    if claims.client_id() != Some(authenticated.client.client_id.as_str()) {
        return Ok(IntrospectionResponse::inactive());
    }

    Ok(IntrospectionResponse {
        active: true,
        scope: claims.scope().map(str::to_string),
        client_id: claims.client_id().map(str::to_string),
        sub: claims.sub().map(str::to_string),
        exp: claims.exp(),
        iat: claims.iat(),
        nbf: claims.nbf(),
        aud: match claims.aud() {
            aud if aud.is_empty() => None,
            aud => Some(aud),
        },
        iss: claims.iss().map(str::to_string),
        jti: claims.jti().map(str::to_string),
        token_type: Some("Bearer".to_string()),
        cnf: claims.get("cnf").cloned(),
    })
}
