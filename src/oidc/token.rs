// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Token endpoint
//!
//! Authenticates the client, then dispatches on `grant_type`:
//!
//! * `authorization_code` - atomic code redemption, PKCE verification,
//!   replay detection with descendant-token revocation
//! * `refresh_token` - signature + registry check, rotation
//! * `client_credentials` - machine tokens, no subject
//! * `password` - delegated to an injected credential checker
//! * `urn:ietf:params:oauth:grant-type:device_code` - RFC 8628 polling
//! * `urn:openid:params:grant-type:ciba` - CIBA polling
//! * `urn:ietf:params:oauth:grant-type:jwt-bearer` - RFC 7523 assertions
//!   with `jti` replay protection
//!
//! ## References
//!
//! * [RFC 6749: The OAuth 2.0 Authorization Framework](https://datatracker.ietf.org/doc/html/rfc6749)
//! * [RFC 7636: Proof Key for Code Exchange](https://datatracker.ietf.org/doc/html/rfc7636)
//! * [RFC 8628: OAuth 2.0 Device Authorization Grant](https://datatracker.ietf.org/doc/html/rfc8628)

use async_trait::async_trait;
use chrono::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client_auth::{authenticate_client, AuthenticatedClient, ClientRequest};
use super::context::{AuthorizationContext, CodeChallengeMethod};
use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::jwt::{ClaimSet, TokenValidator};
use crate::store::ClientInfo;
use crate::utility::hash::pkce_challenge_s256;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const GRANT_CIBA: &str = "urn:openid:params:grant-type:ciba";
pub const GRANT_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Credential checker behind the `password` grant. The engine never sees
/// raw end-user passwords otherwise.
#[async_trait]
pub trait PasswordAuthenticator: Send + Sync {
    /// Verify `username`/`password`, returning the subject on success.
    async fn authenticate(&self, username: &str, password: &str) -> Option<String>;
}

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Handle a token request.
pub async fn handle_token_request(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;
    let grant_type = form.get("grant_type").map(String::as_str).unwrap_or_default();
    debug!(
        "Token request from {:?} with grant_type {:?}",
        authenticated.client.client_id, grant_type
    );

    if grant_type.is_empty() {
        return Err(OidcError::validate(
            ErrorCode::InvalidRequest,
            "grant_type is required",
        ));
    }
    if !authenticated.client.allows_grant_type(grant_type) {
        return Err(OidcError::validate(
            ErrorCode::UnauthorizedClient,
            "Client is not authorized for this grant type",
        ));
    }

    match grant_type {
        GRANT_AUTHORIZATION_CODE => redeem_authorization_code(state, &authenticated, form).await,
        GRANT_REFRESH_TOKEN => redeem_refresh_token(state, &authenticated, form).await,
        GRANT_CLIENT_CREDENTIALS => client_credentials(state, &authenticated, form).await,
        GRANT_PASSWORD => password_grant(state, &authenticated, form).await,
        GRANT_DEVICE_CODE => redeem_device_code(state, &authenticated, form).await,
        GRANT_CIBA => redeem_ciba(state, &authenticated, form).await,
        GRANT_JWT_BEARER => jwt_bearer(state, &authenticated, form).await,
        other => Err(OidcError::validate(
            ErrorCode::UnsupportedGrantType,
            format!("Unsupported grant_type {other:?}"),
        )),
    }
}

/// `authorization_code` redemption (RFC 6749 §4.1.3, RFC 7636 §4.5).
async fn redeem_authorization_code(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let code = form
        .get("code")
        .ok_or_else(|| OidcError::validate(ErrorCode::InvalidRequest, "code is required"))?;

    let Some(context) = state.codes.redeem(code).await else {
        // Replay: a consumed marker means this code already minted tokens.
        // Revoke every descendant before failing (RFC 6749 §4.1.2).
        if let Some(jtis) = state.codes.consumed_tokens(code).await {
            warn!(
                "Authorization code replay for client {:?}; revoking {} descendant tokens",
                authenticated.client.client_id,
                jtis.len()
            );
            for jti in jtis {
                state.tokens.revoke(&jti).await;
            }
            return Err(OidcError::process(
                ErrorCode::InvalidGrant,
                "Authorization code was already redeemed",
            ));
        }
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "Authorization code is invalid or expired",
        ));
    };

    if context.client_id != authenticated.client.client_id {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "Authorization code belongs to a different client",
        ));
    }

    // redirect_uri must repeat the bound value exactly.
    if let Some(bound) = &context.redirect_uri {
        if form.get("redirect_uri") != Some(bound) {
            return Err(OidcError::process(
                ErrorCode::InvalidGrant,
                "redirect_uri does not match the authorization request",
            ));
        }
    }

    verify_pkce(&context, form.get("code_verifier").map(String::as_str))?;

    let issued = issue_token_set(state, authenticated, &context).await?;
    state
        .codes
        .mark_consumed(
            code,
            issued.jtis.clone(),
            authenticated.client.access_token_lifetime.max(
                authenticated.client.refresh_token_lifetime,
            ),
        )
        .await;
    Ok(issued.response)
}

/// PKCE verification at redemption time.
fn verify_pkce(
    context: &AuthorizationContext,
    verifier: Option<&str>,
) -> Result<(), OidcError> {
    let Some(challenge) = &context.code_challenge else {
        return Ok(());
    };
    let Some(verifier) = verifier else {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "code_verifier is required",
        ));
    };
    let matches = match context.code_challenge_method.unwrap_or(CodeChallengeMethod::Plain) {
        CodeChallengeMethod::S256 => &pkce_challenge_s256(verifier) == challenge,
        CodeChallengeMethod::Plain => verifier == challenge.as_str(),
    };
    if !matches {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "code_verifier does not match the challenge",
        ));
    }
    Ok(())
}

/// `refresh_token` redemption with rotation.
async fn redeem_refresh_token(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let token = form.get("refresh_token").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "refresh_token is required")
    })?;

    let validator = TokenValidator::new(state.clock.clone()).with_issuer(state.issuer());
    let verified = validator
        .validate(token, &state.keys.verification_keys())
        .map_err(|e| {
            OidcError::process(ErrorCode::InvalidGrant, format!("Refresh token: {e}"))
        })?;

    if verified.claims.client_id() != Some(authenticated.client.client_id.as_str()) {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "Refresh token was issued to a different client",
        ));
    }

    let jti = verified
        .claims
        .jti()
        .ok_or_else(|| OidcError::bug("refresh token issued without jti"))?;
    if !state.tokens.is_active(jti).await {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "Refresh token is revoked, rotated out or expired",
        ));
    }

    let context: AuthorizationContext = verified
        .claims
        .get("actx")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| OidcError::bug("refresh token carries no authorization context"))?;

    // Optional scope narrowing (RFC 6749 §6).
    let context = match form.get("scope") {
        Some(requested) => {
            let requested: Vec<String> =
                requested.split_whitespace().map(str::to_string).collect();
            if requested.iter().any(|s| !context.scopes.contains(s)) {
                return Err(OidcError::process(
                    ErrorCode::InvalidScope,
                    "Refresh may only narrow the granted scopes",
                ));
            }
            AuthorizationContext {
                scopes: requested,
                ..context
            }
        }
        None => context,
    };

    if authenticated.client.refresh_token_rotation {
        state.tokens.mark_used(jti).await;
    }

    let issued = issue_token_set_with_options(
        state,
        authenticated,
        &context,
        IssueOptions {
            include_refresh: authenticated.client.refresh_token_rotation,
            ..IssueOptions::default()
        },
    )
    .await?;

    let mut response = issued.response;
    if !authenticated.client.refresh_token_rotation {
        // Without rotation the presented token stays valid and is echoed.
        response.refresh_token = Some(token.clone());
    }
    Ok(response)
}

/// `client_credentials` (RFC 6749 §4.4): no subject, audience from the
/// requested resources.
async fn client_credentials(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let requested: Vec<String> = form
        .get("resource")
        .map(|r| r.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let resources = state
        .resources
        .resolve(&requested)?
        .into_iter()
        .map(|r| r.uri)
        .collect();

    let mut scopes = Vec::new();
    for scope in form
        .get("scope")
        .map(|s| s.split_whitespace())
        .into_iter()
        .flatten()
    {
        if scope == "offline_access" {
            // Not an interactive flow; silently dropped per OIDC Core §11.
            continue;
        }
        if !authenticated.client.allows_scope(scope) {
            return Err(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not allowed for this client"),
            ));
        }
        scopes.push(scope.to_string());
    }

    let context = AuthorizationContext {
        subject: None,
        client_id: authenticated.client.client_id.clone(),
        scopes,
        resources,
        claims: None,
        nonce: None,
        acr: None,
        amr: Vec::new(),
        auth_time: None,
        session_id: None,
        redirect_uri: None,
        code_challenge: None,
        code_challenge_method: None,
    };

    let issued = issue_token_set_with_options(
        state,
        authenticated,
        &context,
        IssueOptions {
            include_refresh: false,
            include_id_token: false,
            ..IssueOptions::default()
        },
    )
    .await?;
    Ok(issued.response)
}

/// `password` grant, only when a credential checker was injected.
async fn password_grant(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let Some(checker) = &state.password_authenticator else {
        return Err(OidcError::validate(
            ErrorCode::UnsupportedGrantType,
            "The password grant is not enabled",
        ));
    };
    let username = form.get("username").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "username is required")
    })?;
    let password = form.get("password").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "password is required")
    })?;

    let subject = checker.authenticate(username, password).await.ok_or_else(|| {
        OidcError::process(ErrorCode::InvalidGrant, "Invalid resource owner credentials")
    })?;

    let mut scopes = Vec::new();
    for scope in form
        .get("scope")
        .map(|s| s.split_whitespace())
        .into_iter()
        .flatten()
    {
        if scope == "offline_access" {
            continue;
        }
        if authenticated.client.allows_scope(scope) {
            scopes.push(scope.to_string());
        }
    }

    let context = AuthorizationContext {
        subject: Some(subject),
        client_id: authenticated.client.client_id.clone(),
        scopes,
        resources: Vec::new(),
        claims: None,
        nonce: None,
        acr: None,
        amr: vec!["pwd".to_string()],
        auth_time: Some(state.clock.now_ts()),
        session_id: None,
        redirect_uri: None,
        code_challenge: None,
        code_challenge_method: None,
    };

    let issued = issue_token_set(state, authenticated, &context).await?;
    Ok(issued.response)
}

/// Device-code polling (RFC 8628 §3.4-3.5).
async fn redeem_device_code(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let device_code = form.get("device_code").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "device_code is required")
    })?;

    let Some(request) = state.devices.get(device_code).await else {
        return Err(OidcError::process(
            ErrorCode::ExpiredToken,
            "device_code is unknown or expired",
        ));
    };
    if request.client_id != authenticated.client.client_id {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "device_code belongs to a different client",
        ));
    }

    let interval = state.config.lifetimes.poll_interval;
    let now = state.clock.now();

    use crate::store::DeviceStatus;
    match request.status {
        DeviceStatus::Pending => {
            let error = if now < request.next_poll_at {
                // Polled before the interval elapsed.
                OidcError::process(ErrorCode::SlowDown, "Polling too frequently")
            } else {
                OidcError::process(ErrorCode::AuthorizationPending, "Authorization is pending")
            };
            state
                .devices
                .record_poll(device_code, now + Duration::seconds(interval))
                .await;
            Err(error)
        }
        DeviceStatus::Denied => {
            state.devices.consume(device_code).await;
            Err(OidcError::process(
                ErrorCode::AccessDenied,
                "The user denied the request",
            ))
        }
        DeviceStatus::Authorized => {
            // Atomic: a concurrent poll for the same code loses here.
            let Some(consumed) = state.devices.consume(device_code).await else {
                return Err(OidcError::process(
                    ErrorCode::InvalidGrant,
                    "device_code was already redeemed",
                ));
            };
            let grant = consumed
                .grant
                .ok_or_else(|| OidcError::bug("authorized device request without grant"))?;
            let issued = issue_token_set(state, authenticated, &grant).await?;
            Ok(issued.response)
        }
    }
}

/// CIBA polling; the state machine mirrors the device grant.
async fn redeem_ciba(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let auth_req_id = form.get("auth_req_id").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "auth_req_id is required")
    })?;

    let Some(request) = state.ciba.get(auth_req_id).await else {
        return Err(OidcError::process(
            ErrorCode::ExpiredToken,
            "auth_req_id is unknown or expired",
        ));
    };
    if request.client_id != authenticated.client.client_id {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "auth_req_id belongs to a different client",
        ));
    }

    let interval = state.config.lifetimes.poll_interval;
    let now = state.clock.now();

    use crate::store::CibaStatus;
    match request.status {
        CibaStatus::Pending => {
            let error = if now < request.next_poll_at {
                OidcError::process(ErrorCode::SlowDown, "Polling too frequently")
            } else {
                OidcError::process(ErrorCode::AuthorizationPending, "Authorization is pending")
            };
            state
                .ciba
                .record_poll(auth_req_id, now + Duration::seconds(interval))
                .await;
            Err(error)
        }
        CibaStatus::Denied => {
            state.ciba.consume(auth_req_id).await;
            Err(OidcError::process(
                ErrorCode::AccessDenied,
                "The user denied the request",
            ))
        }
        CibaStatus::Authorized => {
            let Some(consumed) = state.ciba.consume(auth_req_id).await else {
                return Err(OidcError::process(
                    ErrorCode::InvalidGrant,
                    "auth_req_id was already redeemed",
                ));
            };
            let grant = consumed
                .grant
                .ok_or_else(|| OidcError::bug("authorized CIBA request without grant"))?;
            let issued = issue_token_set(state, authenticated, &grant).await?;
            Ok(issued.response)
        }
    }
}

/// JWT-bearer assertion grant (RFC 7523 §2.1).
async fn jwt_bearer(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    form: &HashMap<String, String>,
) -> Result<TokenResponse, OidcError> {
    let assertion = form.get("assertion").ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidRequest, "assertion is required")
    })?;

    // Resolve the trusted issuer from the unverified iss, then verify
    // properly against its JWKS.
    let issuer = unverified_issuer(assertion).ok_or_else(|| {
        OidcError::process(ErrorCode::InvalidGrant, "Assertion is malformed")
    })?;
    let trusted = state
        .config
        .access
        .trusted_issuers
        .iter()
        .find(|t| t.issuer == issuer)
        .ok_or_else(|| {
            OidcError::process(ErrorCode::InvalidGrant, "Assertion issuer is not trusted")
        })?;

    let jwks = state.jwks_client.get(&trusted.jwks_uri).await.map_err(|e| {
        OidcError::process(
            ErrorCode::TemporarilyUnavailable,
            format!("Trusted issuer JWKS unavailable: {e}"),
        )
    })?;

    let header = jsonwebtoken::decode_header(assertion).map_err(|_| {
        OidcError::process(ErrorCode::InvalidGrant, "Assertion is malformed")
    })?;
    let fallback = format!("{:?}", header.alg);
    let validator = TokenValidator::new(state.clock.clone())
        .with_issuer(trusted.issuer.clone())
        .with_audience(state.issuer().to_string());
    let verified = validator
        .validate(assertion, &jwks.verification_keys(Some(&fallback)))
        .map_err(|e| OidcError::process(ErrorCode::InvalidGrant, format!("Assertion: {e}")))?;

    let subject = verified.claims.sub().ok_or_else(|| {
        OidcError::process(ErrorCode::InvalidGrant, "Assertion carries no sub")
    })?;
    let jti = verified.claims.jti().ok_or_else(|| {
        OidcError::process(ErrorCode::InvalidGrant, "Assertion carries no jti")
    })?;
    let exp = verified
        .claims
        .exp()
        .ok_or_else(|| OidcError::process(ErrorCode::InvalidGrant, "Assertion carries no exp"))?;

    // Replay protection: one grant per assertion until its exp.
    if !state.replay.check_and_store(&format!("jb:{jti}"), exp).await {
        return Err(OidcError::process(
            ErrorCode::InvalidGrant,
            "Assertion jti was already used",
        ));
    }

    let mut scopes = Vec::new();
    for scope in form
        .get("scope")
        .map(|s| s.split_whitespace())
        .into_iter()
        .flatten()
    {
        if scope != "offline_access" && authenticated.client.allows_scope(scope) {
            scopes.push(scope.to_string());
        }
    }

    let context = AuthorizationContext {
        subject: Some(subject.to_string()),
        client_id: trusted.client_id.clone(),
        scopes,
        resources: Vec::new(),
        claims: None,
        nonce: None,
        acr: None,
        amr: Vec::new(),
        auth_time: None,
        session_id: None,
        redirect_uri: None,
        code_challenge: None,
        code_challenge_method: None,
    };

    let issued = issue_token_set_with_options(
        state,
        authenticated,
        &context,
        IssueOptions {
            include_refresh: false,
            include_id_token: false,
            ..IssueOptions::default()
        },
    )
    .await?;
    Ok(issued.response)
}

fn unverified_issuer(assertion: &str) -> Option<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = assertion.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    value.get("iss")?.as_str().map(str::to_string)
}

/// Issuance options; the default issues the full applicable set.
#[derive(Debug, Clone)]
pub struct IssueOptions {
    pub include_refresh: bool,
    pub include_id_token: bool,

    /// Extra ID token claims the caller computed (`c_hash` for hybrid
    /// flows).
    pub id_token_extra: Vec<(String, String)>,
}

impl Default for IssueOptions {
    fn default() -> Self {
        Self {
            include_refresh: true,
            include_id_token: true,
            id_token_extra: Vec::new(),
        }
    }
}

/// A minted token set plus the registry identities it created.
pub struct IssuedTokens {
    pub response: TokenResponse,
    pub jtis: Vec<String>,
}

/// Issue the applicable token set for `context`.
pub async fn issue_token_set(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    context: &AuthorizationContext,
) -> Result<IssuedTokens, OidcError> {
    issue_token_set_with_options(state, authenticated, context, IssueOptions::default()).await
}

pub async fn issue_token_set_with_options(
    state: &OidcState,
    authenticated: &AuthenticatedClient,
    context: &AuthorizationContext,
    options: IssueOptions,
) -> Result<IssuedTokens, OidcError> {
    let client = &authenticated.client;
    let key = state.keys.default_signing_key();
    let now = state.clock.now_ts();
    let mut jtis = Vec::new();

    let subject = context
        .subject
        .as_deref()
        .map(|local| released_subject(state, client, local));

    // Access token.
    let access_exp = now + client.access_token_lifetime;
    let access_jti = uuid::Uuid::new_v4().to_string();
    let mut access = ClaimSet::new();
    if let Some(sub) = &subject {
        access.set_str("sub", sub.clone());
    }
    if context.resources.is_empty() {
        access.set_aud(&[client.client_id.clone()]);
    } else {
        access.set_aud(&context.resources);
    }
    access.set_str("client_id", client.client_id.clone());
    if !context.scopes.is_empty() {
        access.set_str("scope", context.scope_string());
    }
    access.set_str("jti", access_jti.clone());
    access.set_i64("exp", access_exp);
    if let Some(thumbprint) = bound_thumbprint(authenticated) {
        access.set("cnf", serde_json::json!({ "x5t#S256": thumbprint }));
    }
    let access_token = state
        .signer
        .sign(access, &key)
        .map_err(|e| OidcError::bug(&format!("access token signing failed: {e}")))?;
    state.tokens.register(&access_jti, access_exp).await;
    jtis.push(access_jti);

    // ID token, for OIDC flows.
    let id_token = if options.include_id_token
        && subject.is_some()
        && context.scopes.iter().any(|s| s == "openid")
    {
        let id_key = state
            .keys
            .signing_key_for(&client.id_token_signed_response_alg)
            .unwrap_or_else(|| key.clone());
        let mut id = ClaimSet::new();
        id.set_str("sub", subject.clone().unwrap());
        id.set_aud(&[client.client_id.clone()]);
        id.set_i64("exp", now + state.config.lifetimes.id_token_ttl);
        if let Some(nonce) = &context.nonce {
            id.set_str("nonce", nonce.clone());
        }
        if let Some(acr) = &context.acr {
            id.set_str("acr", acr.clone());
        }
        if !context.amr.is_empty() {
            id.set(
                "amr",
                serde_json::Value::Array(
                    context
                        .amr
                        .iter()
                        .map(|m| serde_json::Value::String(m.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(auth_time) = context.auth_time {
            id.set_i64("auth_time", auth_time);
        }
        if let Some(sid) = &context.session_id {
            id.set_str("sid", sid.clone());
        }
        // Binds the access token to this id_token (OIDC Core §3.1.3.6).
        id.set_str(
            "at_hash",
            crate::utility::hash::half_hash_s256(&access_token),
        );
        for (name, value) in &options.id_token_extra {
            id.set_str(name, value.clone());
        }
        Some(
            state
                .signer
                .sign(id, &id_key)
                .map_err(|e| OidcError::bug(&format!("id token signing failed: {e}")))?,
        )
    } else {
        None
    };

    // Refresh token, carrying the full context for re-issuance.
    let refresh_token = if options.include_refresh && context.offline_access() {
        let refresh_exp = now + client.refresh_token_lifetime;
        let refresh_jti = uuid::Uuid::new_v4().to_string();
        let mut refresh = ClaimSet::new();
        if let Some(sub) = &subject {
            refresh.set_str("sub", sub.clone());
        }
        refresh.set_str("client_id", client.client_id.clone());
        refresh.set_str("scope", context.scope_string());
        refresh.set_str("jti", refresh_jti.clone());
        refresh.set_i64("exp", refresh_exp);
        refresh.set(
            "actx",
            serde_json::to_value(context)
                .map_err(|e| OidcError::bug(&format!("context serialization failed: {e}")))?,
        );
        let token = state
            .signer
            .sign(refresh, &key)
            .map_err(|e| OidcError::bug(&format!("refresh token signing failed: {e}")))?;
        state.tokens.register(&refresh_jti, refresh_exp).await;
        jtis.push(refresh_jti);
        Some(token)
    } else {
        None
    };

    info!(
        "Issued token set for client {:?} (scopes: {:?})",
        client.client_id, context.scopes
    );

    Ok(IssuedTokens {
        response: TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: client.access_token_lifetime,
            refresh_token,
            id_token,
            scope: if context.scopes.is_empty() {
                None
            } else {
                Some(context.scope_string())
            },
        },
        jtis,
    })
}

/// The subject released to this client: pairwise-derived when registered.
pub fn released_subject(state: &OidcState, client: &ClientInfo, local_sub: &str) -> String {
    if client.subject_type == "pairwise" {
        if let Some(sector) = client.pairwise_sector() {
            return crate::utility::hash::pairwise_subject(
                &sector,
                local_sub,
                &state.pairwise_salt,
            );
        }
    }
    local_sub.to_string()
}

fn bound_thumbprint(authenticated: &AuthenticatedClient) -> Option<String> {
    if authenticated.client.certificate_bound_access_tokens {
        authenticated.certificate_thumbprint.clone()
    } else {
        None
    }
}
