// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Authorization endpoint
//!
//! Runs the fetch and validation stages, then mints the artifacts the
//! `response_type` asks for: an authorization code, an ID token, an access
//! token, or a combination. Response parameters travel back through the
//! negotiated `response_mode`: `query`, `fragment`, `form_post`, or their
//! JARM variants (`jwt`, `query.jwt`, `fragment.jwt`, `form_post.jwt`)
//! where the parameter set is wrapped in a JWT signed by the server.
//!
//! Errors are returned through the same machinery, except pre-redirect
//! failures (unknown client, unregistered redirect URI) which must never
//! redirect and surface as an HTML error page instead.

use std::collections::HashMap;

use log::debug;
use serde_json::json;

use super::client_auth::AuthenticatedClient;
use super::context::{AuthSession, AuthorizationContext};
use super::error::{ErrorCode, OidcError};
use super::fetch::assemble_request;
use super::session::session_state_value;
use super::token::{issue_token_set_with_options, IssueOptions};
use super::validate::{validate_authorization_request, ValidatedAuthorizationRequest};
use super::OidcState;
use crate::jwt::ClaimSet;
use crate::utility::random::opaque_token;

/// How response parameters are carried back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
    FormPost,
    QueryJwt,
    FragmentJwt,
    FormPostJwt,
}

impl ResponseMode {
    /// Parse the `response_mode` parameter, falling back to the default of
    /// `response_type`: `query` for pure code flows, `fragment` otherwise.
    pub fn negotiate(raw: Option<&str>, response_type: &str) -> Option<Self> {
        let fragment_default = response_type
            .split_whitespace()
            .any(|t| t == "id_token" || t == "token");
        match raw {
            None => Some(if fragment_default {
                Self::Fragment
            } else {
                Self::Query
            }),
            Some("query") if !fragment_default => Some(Self::Query),
            // Tokens must never land in a query string.
            Some("query") => None,
            Some("fragment") => Some(Self::Fragment),
            Some("form_post") => Some(Self::FormPost),
            Some("jwt") => Some(if fragment_default {
                Self::FragmentJwt
            } else {
                Self::QueryJwt
            }),
            Some("query.jwt") if !fragment_default => Some(Self::QueryJwt),
            Some("query.jwt") => None,
            Some("fragment.jwt") => Some(Self::FragmentJwt),
            Some("form_post.jwt") => Some(Self::FormPostJwt),
            Some(_) => None,
        }
    }

    fn is_jwt(&self) -> bool {
        matches!(self, Self::QueryJwt | Self::FragmentJwt | Self::FormPostJwt)
    }
}

/// Outcome of an authorization request.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Redirect the user agent to this URL.
    Redirect(String),

    /// Render this auto-submitting HTML document (`form_post` modes).
    FormPost(String),

    /// No authenticated session and the request permits interaction; the
    /// host must show its login UI and replay the request afterwards.
    LoginRequired,

    /// Pre-redirect failure; the host renders an error page. Redirecting
    /// would send the error to an unvalidated URI.
    ErrorPage(OidcError),
}

/// Handle an authorization request end to end.
pub async fn handle_authorization_request(
    state: &OidcState,
    params: HashMap<String, String>,
    session: Option<&AuthSession>,
) -> Result<AuthorizeOutcome, OidcError> {
    // Fetch stage. Failures here may predate redirect URI validation, so
    // they are only redirectable when the inline parameters already name a
    // trustworthy destination.
    let assembled = match assemble_request(state, params.clone()).await {
        Ok(assembled) => assembled,
        Err(error) => return Ok(error_outcome(state, &params, error)),
    };

    // Validate stage.
    let request = match validate_authorization_request(state, &assembled, session) {
        Ok(request) => request,
        Err(error) => return Ok(error_outcome(state, &assembled, error)),
    };

    let Some(mode) =
        ResponseMode::negotiate(request.response_mode.as_deref(), &request.response_type)
    else {
        return Ok(error_outcome(
            state,
            &assembled,
            OidcError::validate(ErrorCode::InvalidRequest, "Unsupported response_mode"),
        ));
    };

    // The engine does not authenticate users; without a session the host
    // owns the next step (the prompt validator already turned prompt=none
    // into login_required).
    let Some(session) = session else {
        return Ok(AuthorizeOutcome::LoginRequired);
    };

    process_authorized(state, request, mode, session).await
}

/// Process stage: mint artifacts and format the response.
async fn process_authorized(
    state: &OidcState,
    request: ValidatedAuthorizationRequest,
    mode: ResponseMode,
    session: &AuthSession,
) -> Result<AuthorizeOutcome, OidcError> {
    let op_session = state.sessions.upsert(&session.session_id, &session.subject).await;
    state
        .sessions
        .add_client(&session.session_id, &request.client.client_id)
        .await;

    let context = AuthorizationContext {
        subject: Some(session.subject.clone()),
        client_id: request.client.client_id.clone(),
        scopes: request.scopes.clone(),
        resources: request.resources.clone(),
        claims: request.claims.clone(),
        nonce: request.nonce.clone(),
        acr: session.acr.clone(),
        amr: session.amr.clone(),
        auth_time: Some(session.auth_time.timestamp()),
        session_id: Some(session.session_id.clone()),
        redirect_uri: Some(request.redirect_uri.clone()),
        code_challenge: request.code_challenge.clone(),
        code_challenge_method: request.code_challenge_method,
    };

    let wants_code = request.response_type.split_whitespace().any(|t| t == "code");
    let wants_token = request.response_type.split_whitespace().any(|t| t == "token");
    let wants_id_token = request
        .response_type
        .split_whitespace()
        .any(|t| t == "id_token");

    let mut response: Vec<(String, String)> = Vec::new();
    let mut id_token_extra = Vec::new();

    if wants_code {
        let code = opaque_token(32);
        state
            .codes
            .insert(&code, context.clone(), state.config.lifetimes.authorization_code_ttl)
            .await;
        debug!(
            "Issued authorization code for client {:?}",
            request.client.client_id
        );
        if wants_id_token {
            // Hybrid flow: the id_token vouches for the code.
            id_token_extra.push((
                "c_hash".to_string(),
                crate::utility::hash::half_hash_s256(&code),
            ));
        }
        response.push(("code".to_string(), code));
    }

    if wants_token || wants_id_token {
        // Front-channel issuance; the client was identified, not
        // authenticated, which is what these response types specify.
        let authenticated = AuthenticatedClient {
            client: request.client.clone(),
            method: "none".to_string(),
            certificate_thumbprint: None,
        };
        let issued = issue_token_set_with_options(
            state,
            &authenticated,
            &context,
            IssueOptions {
                include_refresh: false,
                include_id_token: wants_id_token,
                id_token_extra,
            },
        )
        .await?;
        if wants_token {
            response.push(("access_token".to_string(), issued.response.access_token));
            response.push(("token_type".to_string(), "Bearer".to_string()));
            response.push((
                "expires_in".to_string(),
                issued.response.expires_in.to_string(),
            ));
        }
        if let Some(id_token) = issued.response.id_token {
            response.push(("id_token".to_string(), id_token));
        }
    }

    if let Some(state_param) = &request.state {
        response.push(("state".to_string(), state_param.clone()));
    }

    // OIDC Session Management: hand the RP the value its iframe polls
    // against.
    if let Ok(origin) = origin_of(&request.redirect_uri) {
        response.push((
            "session_state".to_string(),
            session_state_value(&request.client.client_id, &origin, &op_session.opbs),
        ));
    }

    format_response(state, &request.client.client_id, &request.redirect_uri, mode, response)
}

/// Wrap `params` for delivery through `mode`.
fn format_response(
    state: &OidcState,
    client_id: &str,
    redirect_uri: &str,
    mode: ResponseMode,
    params: Vec<(String, String)>,
) -> Result<AuthorizeOutcome, OidcError> {
    let params = if mode.is_jwt() {
        vec![("response".to_string(), jarm_response(state, client_id, params)?)]
    } else {
        params
    };

    match mode {
        ResponseMode::Query | ResponseMode::QueryJwt => {
            let mut url = url::Url::parse(redirect_uri)
                .map_err(|_| OidcError::bug("validated redirect_uri failed to parse"))?;
            url.query_pairs_mut().extend_pairs(&params);
            Ok(AuthorizeOutcome::Redirect(url.to_string()))
        }
        ResponseMode::Fragment | ResponseMode::FragmentJwt => {
            let encoded = serde_urlencoded::to_string(&params)
                .map_err(|_| OidcError::bug("response parameters failed to encode"))?;
            Ok(AuthorizeOutcome::Redirect(format!(
                "{redirect_uri}#{encoded}"
            )))
        }
        ResponseMode::FormPost | ResponseMode::FormPostJwt => {
            Ok(AuthorizeOutcome::FormPost(form_post_page(redirect_uri, &params)?))
        }
    }
}

/// JARM: the response parameters as claims of a server-signed JWT.
fn jarm_response(
    state: &OidcState,
    client_id: &str,
    params: Vec<(String, String)>,
) -> Result<String, OidcError> {
    let mut claims = ClaimSet::new();
    for (key, value) in params {
        claims.set_str(&key, value);
    }
    claims.set_aud(&[client_id.to_string()]);
    claims.set_i64("exp", state.clock.now_ts() + 600);

    let key = state.keys.default_signing_key();
    state
        .signer
        .sign(claims, &key)
        .map_err(|e| OidcError::bug(&format!("JARM signing failed: {e}")))
}

/// The auto-submitting `form_post` document (OAuth 2.0 Form Post Response
/// Mode §2).
fn form_post_page(redirect_uri: &str, params: &[(String, String)]) -> Result<String, OidcError> {
    let handlebars = handlebars::Handlebars::new();
    handlebars
        .render_template(
            r#"<!DOCTYPE html>
<html>
<head><title>Submit This Form</title></head>
<body onload="javascript:document.forms[0].submit()">
<form method="post" action="{{action}}">
{{#each fields}}<input type="hidden" name="{{this.name}}" value="{{this.value}}"/>
{{/each}}<noscript><button type="submit">Continue</button></noscript>
</form>
</body>
</html>
"#,
            &json!({
                "action": redirect_uri,
                "fields": params
                    .iter()
                    .map(|(name, value)| json!({ "name": name, "value": value }))
                    .collect::<Vec<_>>(),
            }),
        )
        .map_err(|e| OidcError::bug(&format!("form_post rendering failed: {e}")))
}

/// Route an error to the right transport: redirect when the destination
/// was validated, error page otherwise.
fn error_outcome(
    state: &OidcState,
    params: &HashMap<String, String>,
    error: OidcError,
) -> AuthorizeOutcome {
    let Some(redirect_uri) = safe_redirect_uri(state, params) else {
        return AuthorizeOutcome::ErrorPage(error);
    };

    let response_type = params
        .get("response_type")
        .map(String::as_str)
        .unwrap_or("code");
    let mode = ResponseMode::negotiate(
        params.get("response_mode").map(String::as_str),
        response_type,
    )
    .unwrap_or(ResponseMode::Query);

    let mut response = vec![
        ("error".to_string(), error.code.as_str().to_string()),
        ("error_description".to_string(), error.description.clone()),
    ];
    if let Some(state_param) = params.get("state") {
        response.push(("state".to_string(), state_param.clone()));
    }

    // Error delivery is best effort; a formatting failure falls back to
    // the error page.
    match format_response(
        state,
        params.get("client_id").map(String::as_str).unwrap_or(""),
        &redirect_uri,
        mode,
        response,
    ) {
        Ok(outcome) => outcome,
        Err(_) => AuthorizeOutcome::ErrorPage(error),
    }
}

/// The redirect URI, only when it is registered for the claimed client.
fn safe_redirect_uri(state: &OidcState, params: &HashMap<String, String>) -> Option<String> {
    let client = state.clients.get(params.get("client_id")?)?;
    let uri = params.get("redirect_uri")?;
    client.allows_redirect_uri(uri).then(|| uri.clone())
}

fn origin_of(redirect_uri: &str) -> Result<String, url::ParseError> {
    let parsed = url::Url::parse(redirect_uri)?;
    Ok(parsed.origin().ascii_serialization())
}
