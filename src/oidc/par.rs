// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Pushed Authorization Requests (RFC 9126)
//!
//! Validates an authorization request ahead of time — with the same
//! pipeline as the authorization endpoint, minus the user-presence checks
//! — and stores it under a one-time `urn:ietf:params:oauth:request_uri:`
//! handle with a short TTL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client_auth::{authenticate_client, ClientRequest};
use super::error::{ErrorCode, OidcError};
use super::fetch::assemble_request;
use super::validate::validate_authorization_request;
use super::OidcState;
use crate::store::PushedAuthorizationRequest;

/// Response of a successful push (RFC 9126 §2.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParResponse {
    pub request_uri: String,
    pub expires_in: i64,
}

/// Handle a pushed authorization request.
pub async fn handle_par_request(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<ParResponse, OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;

    // A push must not itself reference a pushed request (RFC 9126 §2.1).
    if form.contains_key("request_uri") {
        return Err(OidcError::validate(
            ErrorCode::InvalidRequest,
            "request_uri is not accepted at the PAR endpoint",
        ));
    }

    let mut params = form.clone();
    params.insert(
        "client_id".to_string(),
        authenticated.client.client_id.clone(),
    );

    let assembled = assemble_request(state, params).await?;
    if assembled.get("client_id") != Some(&authenticated.client.client_id) {
        return Err(OidcError::validate(
            ErrorCode::InvalidRequest,
            "Pushed request names a different client",
        ));
    }

    // Full authorization validation, except user-presence conformance:
    // login_required only matters once the user agent arrives.
    match validate_authorization_request(state, &assembled, None) {
        Ok(_) => {}
        Err(error) if error.code == ErrorCode::LoginRequired => {}
        Err(error) => return Err(error),
    }

    let ttl = state.config.lifetimes.effective_par_ttl();
    let request_uri = state
        .par
        .insert(
            PushedAuthorizationRequest {
                client_id: authenticated.client.client_id.clone(),
                parameters: assembled,
            },
            ttl,
        )
        .await;

    log::debug!(
        "Stored pushed request {request_uri} for client {:?}",
        authenticated.client.client_id
    );
    Ok(ParResponse {
        request_uri,
        expires_in: ttl,
    })
}
