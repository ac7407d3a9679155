// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # End-session and logout
//!
//! RP-initiated logout (OIDC Session Management / Front-Channel Logout /
//! Back-Channel Logout). Validates `id_token_hint`, `client_id` and
//! `post_logout_redirect_uri`, ends the server-side session, and notifies
//! every participating client:
//!
//! * front-channel: the host renders the collected URIs as hidden iframes
//! * back-channel: the engine POSTs signed logout tokens with bounded
//!   concurrency and a per-target timeout; individual failures are logged
//!   and never fail the end-session response

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use serde_json::json;

use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::jwt::{ClaimSet, TokenValidator};
use crate::store::Session;

/// Logout event URI of the `events` claim (Back-Channel Logout §2.4).
pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// What the host must do after end-session processing.
#[derive(Debug)]
pub struct EndSessionOutcome {
    /// Validated post-logout destination (already carrying `state`), when
    /// the client registered one.
    pub redirect_uri: Option<String>,

    /// Front-channel logout URIs to render as hidden iframes.
    pub frontchannel_logout_uris: Vec<String>,

    /// The session that was ended, if any; the host clears its cookie.
    pub ended_session_id: Option<String>,
}

/// Handle an end-session request.
pub async fn handle_end_session(
    state: &OidcState,
    params: &HashMap<String, String>,
    current_session_id: Option<&str>,
) -> Result<EndSessionOutcome, OidcError> {
    // id_token_hint identifies the RP and the session; an expired hint is
    // still acceptable (RP-Initiated Logout §2).
    let mut hint_client: Option<String> = None;
    let mut hint_sid: Option<String> = None;
    if let Some(hint) = params.get("id_token_hint") {
        let validator = TokenValidator::new(state.clock.clone()).with_issuer(state.issuer());
        let verified = validator
            .validate_signature_only(hint, &state.keys.verification_keys())
            .map_err(|e| {
                OidcError::validate(
                    ErrorCode::InvalidRequest,
                    format!("id_token_hint rejected: {e}"),
                )
            })?;
        hint_client = verified.claims.aud().first().cloned();
        hint_sid = verified.claims.get_str("sid").map(str::to_string);
    }

    // An explicit client_id must agree with the hint.
    let client_id = match (params.get("client_id"), &hint_client) {
        (Some(explicit), Some(from_hint)) if explicit != from_hint => {
            return Err(OidcError::validate(
                ErrorCode::InvalidRequest,
                "client_id contradicts id_token_hint",
            ));
        }
        (Some(explicit), _) => Some(explicit.clone()),
        (None, hint) => hint.clone(),
    };

    // post_logout_redirect_uri only works for an identified client that
    // registered it.
    let redirect_uri = match params.get("post_logout_redirect_uri") {
        None => None,
        Some(uri) => {
            let client = client_id
                .as_deref()
                .and_then(|id| state.clients.get(id))
                .ok_or_else(|| {
                    OidcError::validate(
                        ErrorCode::InvalidRequest,
                        "post_logout_redirect_uri requires an identified client",
                    )
                })?;
            if !client.allows_post_logout_redirect_uri(uri) {
                return Err(OidcError::validate(
                    ErrorCode::InvalidRequest,
                    "post_logout_redirect_uri is not registered",
                ));
            }
            let mut target = url::Url::parse(uri).map_err(|_| {
                OidcError::validate(ErrorCode::InvalidRequest, "post_logout_redirect_uri is not a URL")
            })?;
            if let Some(state_param) = params.get("state") {
                target.query_pairs_mut().append_pair("state", state_param);
            }
            Some(target.to_string())
        }
    };

    let session_id = hint_sid.or_else(|| current_session_id.map(str::to_string));
    let Some(session_id) = session_id else {
        // Nothing to end; still honor the redirect.
        return Ok(EndSessionOutcome {
            redirect_uri,
            frontchannel_logout_uris: Vec::new(),
            ended_session_id: None,
        });
    };

    let Some(session) = state.sessions.end(&session_id).await else {
        return Ok(EndSessionOutcome {
            redirect_uri,
            frontchannel_logout_uris: Vec::new(),
            ended_session_id: Some(session_id),
        });
    };
    debug!(
        "Ending session {:?} with {} participating clients",
        session.session_id,
        session.clients.len()
    );

    let mut frontchannel = Vec::new();
    let mut backchannel = Vec::new();
    for participant in &session.clients {
        let Some(client) = state.clients.get(participant) else {
            continue;
        };
        if let Some(uri) = &client.frontchannel_logout_uri {
            if let Ok(mut url) = url::Url::parse(uri) {
                url.query_pairs_mut()
                    .append_pair("iss", state.issuer())
                    .append_pair("sid", &session.session_id);
                frontchannel.push(url.to_string());
            }
        }
        if let Some(uri) = &client.backchannel_logout_uri {
            backchannel.push((client.client_id.clone(), uri.clone()));
        }
    }

    deliver_backchannel_logout(state, &session, backchannel).await;

    Ok(EndSessionOutcome {
        redirect_uri,
        frontchannel_logout_uris: frontchannel,
        ended_session_id: Some(session.session_id),
    })
}

/// POST a signed logout token to every back-channel target, with bounded
/// concurrency and a per-target timeout.
async fn deliver_backchannel_logout(
    state: &OidcState,
    session: &Session,
    targets: Vec<(String, String)>,
) {
    if targets.is_empty() {
        return;
    }
    let timeout = std::time::Duration::from_secs(state.config.logout.backchannel_timeout);
    let concurrency = state.config.logout.backchannel_concurrency.max(1);

    stream::iter(targets)
        .for_each_concurrent(concurrency, |(client_id, uri)| {
            let session = session.clone();
            async move {
                let token = match logout_token(state, &session, &client_id) {
                    Ok(token) => token,
                    Err(error) => {
                        warn!("Logout token for {client_id:?} failed to sign: {error}");
                        return;
                    }
                };
                let form = [("logout_token", token.as_str())];
                let delivery = state.fetcher.post_form(&uri, &form);
                match tokio::time::timeout(timeout, delivery).await {
                    Ok(Ok(status)) if (200..300).contains(&status) => {
                        debug!("Back-channel logout delivered to {client_id:?}");
                    }
                    Ok(Ok(status)) => {
                        warn!("Back-channel logout to {client_id:?} answered {status}");
                    }
                    Ok(Err(error)) => {
                        warn!("Back-channel logout to {client_id:?} failed: {error}");
                    }
                    Err(_) => {
                        warn!("Back-channel logout to {client_id:?} timed out");
                    }
                }
            }
        })
        .await;
}

/// Build the signed logout token for one client (Back-Channel Logout §2.4).
fn logout_token(
    state: &OidcState,
    session: &Session,
    client_id: &str,
) -> Result<String, OidcError> {
    let mut claims = ClaimSet::new();
    claims.set_aud(&[client_id.to_string()]);
    if let Some(client) = state.clients.get(client_id) {
        claims.set_str(
            "sub",
            super::token::released_subject(state, &client, &session.subject),
        );
    } else {
        claims.set_str("sub", session.subject.clone());
    }
    claims.set_str("sid", session.session_id.clone());
    claims.set("events", json!({ BACKCHANNEL_LOGOUT_EVENT: {} }));
    claims.set_i64(
        "exp",
        state.clock.now_ts() + state.config.logout.logout_token_lifetime,
    );

    let key = state.keys.default_signing_key();
    state
        .signer
        .sign(claims, &key)
        .map_err(|e| OidcError::bug(&format!("logout token signing failed: {e}")))
}
