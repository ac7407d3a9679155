// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Client-Initiated Backchannel Authentication
//!
//! The initiation endpoint validates the hint and mints an `auth_req_id`;
//! the authentication device later approves or denies through the same
//! transitions as the device grant, and the client polls the token
//! endpoint with `urn:openid:params:grant-type:ciba`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client_auth::{authenticate_client, ClientRequest};
use super::context::AuthorizationContext;
use super::error::{ErrorCode, OidcError};
use super::token::GRANT_CIBA;
use super::OidcState;
use crate::store::{CibaAuthRequest, CibaStatus};
use crate::utility::random::opaque_token;

/// Response of a successful initiation (CIBA Core §7.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CibaResponse {
    pub auth_req_id: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// Handle a backchannel authentication request.
pub async fn handle_backchannel_authentication(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<CibaResponse, OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;
    if !authenticated.client.allows_grant_type(GRANT_CIBA) {
        return Err(OidcError::validate(
            ErrorCode::UnauthorizedClient,
            "Client is not authorized for CIBA",
        ));
    }

    // Exactly one hint identifies the user to authenticate.
    let hints: Vec<&str> = ["login_hint", "login_hint_token", "id_token_hint"]
        .iter()
        .filter_map(|h| form.get(*h).map(|_| *h))
        .collect();
    if hints.len() != 1 {
        return Err(OidcError::validate(
            ErrorCode::InvalidRequest,
            "Exactly one of login_hint, login_hint_token or id_token_hint is required",
        ));
    }
    let login_hint = match hints[0] {
        "login_hint" => form.get("login_hint").cloned().unwrap_or_default(),
        "id_token_hint" => {
            // The hint is one of our own ID tokens; its sub names the user.
            let token = form.get("id_token_hint").unwrap();
            let validator = crate::jwt::TokenValidator::new(state.clock.clone())
                .with_issuer(state.issuer())
                .allow_missing_exp();
            let verified = validator
                .validate(token, &state.keys.verification_keys())
                .map_err(|e| {
                    OidcError::validate(
                        ErrorCode::InvalidRequest,
                        format!("id_token_hint rejected: {e}"),
                    )
                })?;
            verified
                .claims
                .sub()
                .map(str::to_string)
                .ok_or_else(|| {
                    OidcError::validate(ErrorCode::InvalidRequest, "id_token_hint has no sub")
                })?
        }
        _ => {
            return Err(OidcError::validate(
                ErrorCode::InvalidRequest,
                "login_hint_token is not supported by this server",
            ))
        }
    };

    let mut scopes = Vec::new();
    for scope in form
        .get("scope")
        .map(|s| s.split_whitespace())
        .into_iter()
        .flatten()
    {
        if !state.scopes.is_known(scope) || !authenticated.client.allows_scope(scope) {
            return Err(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not available to this client"),
            ));
        }
        scopes.push(scope.to_string());
    }
    if !scopes.iter().any(|s| s == "openid") {
        return Err(OidcError::validate(
            ErrorCode::InvalidScope,
            "CIBA requests must include the openid scope",
        ));
    }

    let lifetimes = &state.config.lifetimes;
    let auth_req_id = opaque_token(32);
    let request = CibaAuthRequest {
        auth_req_id: auth_req_id.clone(),
        client_id: authenticated.client.client_id.clone(),
        scopes,
        resources: Vec::new(),
        login_hint,
        binding_message: form.get("binding_message").cloned(),
        status: CibaStatus::Pending,
        next_poll_at: state.clock.now(),
        grant: None,
    };
    state.ciba.insert(request, lifetimes.ciba_request_ttl).await;

    log::info!(
        "CIBA request started for client {:?}",
        authenticated.client.client_id
    );
    Ok(CibaResponse {
        auth_req_id,
        expires_in: lifetimes.ciba_request_ttl,
        interval: lifetimes.poll_interval,
    })
}

/// Record the authentication device's approval.
pub async fn approve_ciba_request(
    state: &OidcState,
    auth_req_id: &str,
    grant: AuthorizationContext,
) -> Result<(), OidcError> {
    if state.ciba.approve(auth_req_id, grant).await {
        Ok(())
    } else {
        Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "auth_req_id is unknown, expired or already decided",
        ))
    }
}

/// Record the authentication device's denial.
pub async fn deny_ciba_request(state: &OidcState, auth_req_id: &str) -> Result<(), OidcError> {
    if state.ciba.deny(auth_req_id).await {
        Ok(())
    } else {
        Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "auth_req_id is unknown, expired or already decided",
        ))
    }
}
