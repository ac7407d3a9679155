// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # UserInfo endpoint
//!
//! Authenticates the caller with an access token (bearer, or mTLS-bound
//! via `cnf`), resolves the granted claims from the token's scopes and
//! asks the injected [`UserInfoProvider`] for the values. Released claims
//! are strictly bounded by the scopes granted at authorization time.
//!
//! The response is a JSON object, or a server-signed JWT when the client
//! registered `userinfo_signed_response_alg`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::jwt::{ClaimSet, TokenValidator};

/// Source of end-user claim values. The engine never stores user data.
#[async_trait]
pub trait UserInfoProvider: Send + Sync {
    /// Values for `claims` of `subject`. Unknown claims are simply absent
    /// from the result.
    async fn claims_for(&self, subject: &str, claims: &[String]) -> Map<String, Value>;
}

/// Default provider: releases nothing beyond `sub`.
pub struct NoUserInfo;

#[async_trait]
impl UserInfoProvider for NoUserInfo {
    async fn claims_for(&self, _subject: &str, _claims: &[String]) -> Map<String, Value> {
        Map::new()
    }
}

/// UserInfo result: plain JSON or a signed JWT.
#[derive(Debug)]
pub enum UserInfoResponse {
    Json(Value),
    Jwt(String),
}

/// Handle a UserInfo request.
///
/// `presented_thumbprint` is the SHA-256 of the TLS client certificate on
/// the connection, when one was presented; it must match `cnf.x5t#S256`
/// for sender-constrained tokens.
pub async fn handle_userinfo(
    state: &OidcState,
    access_token: &str,
    presented_thumbprint: Option<&str>,
) -> Result<UserInfoResponse, OidcError> {
    let validator = TokenValidator::new(state.clock.clone()).with_issuer(state.issuer());
    let verified = validator
        .validate(access_token, &state.keys.verification_keys())
        .map_err(|e| {
            OidcError::validate(ErrorCode::InvalidToken, format!("Access token: {e}"))
        })?;
    let claims = verified.claims;

    if let Some(jti) = claims.jti() {
        if !state.tokens.is_active(jti).await {
            return Err(OidcError::validate(
                ErrorCode::InvalidToken,
                "Access token is revoked",
            ));
        }
    }

    // Sender-constrained tokens only work on the constrained channel
    // (RFC 8705 §3).
    if let Some(expected) = claims.cnf_x5t_s256() {
        if presented_thumbprint != Some(expected) {
            return Err(OidcError::validate(
                ErrorCode::InvalidToken,
                "Token is bound to a different client certificate",
            ));
        }
    }

    let scopes = claims.scopes();
    if !scopes.iter().any(|s| s == "openid") {
        return Err(OidcError::validate(
            ErrorCode::InsufficientScope,
            "The openid scope is required for UserInfo",
        ));
    }
    let subject = claims.sub().ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidToken, "Access token carries no subject")
    })?;

    // Scope-bounded claim release.
    let released = state.scopes.claims_for(&scopes);
    let mut body = state
        .userinfo_provider
        .claims_for(subject, &released)
        .await;
    body.retain(|claim, _| released.iter().any(|r| r == claim));
    body.insert("sub".to_string(), Value::String(subject.to_string()));

    let client = claims
        .client_id()
        .and_then(|client_id| state.clients.get(client_id));
    if let Some(alg) = client.and_then(|c| c.userinfo_signed_response_alg) {
        let key = state.keys.signing_key_for(&alg).ok_or_else(|| {
            OidcError::bug(&format!("no signing key for userinfo alg {alg:?}"))
        })?;
        let mut jwt_claims = ClaimSet(body);
        jwt_claims.set_aud(&[claims.client_id().unwrap_or_default().to_string()]);
        let token = state
            .signer
            .sign(jwt_claims, &key)
            .map_err(|e| OidcError::bug(&format!("userinfo signing failed: {e}")))?;
        return Ok(UserInfoResponse::Jwt(token));
    }

    Ok(UserInfoResponse::Json(Value::Object(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::oidc::client_auth::AuthenticatedClient;
    use crate::oidc::context::AuthorizationContext;
    use crate::oidc::token::issue_token_set;
    use std::sync::Arc;

    struct StaticProvider;

    #[async_trait]
    impl UserInfoProvider for StaticProvider {
        async fn claims_for(&self, _subject: &str, _claims: &[String]) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("email".to_string(), Value::String("u@example.com".into()));
            map.insert("email_verified".to_string(), Value::Bool(true));
            // Not granted by any scope below; must never be released.
            map.insert("name".to_string(), Value::String("U Ser".into()));
            map
        }
    }

    async fn state_and_token(scope_list: &[&str]) -> (OidcState, String) {
        let yaml = r#"
access:
  clients:
    - client_id: "app"
      grant_types: ["authorization_code"]
      redirect_uris: ["https://app.example.com/cb"]
      scopes: ["openid", "email", "profile"]
      token_endpoint_auth_method: "none"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let state = OidcState::from_config(Arc::new(config))
            .unwrap()
            .with_userinfo_provider(Arc::new(StaticProvider));

        let client = state.clients.get("app").unwrap();
        let context = AuthorizationContext {
            subject: Some("user-1".to_string()),
            client_id: "app".to_string(),
            scopes: scope_list.iter().map(|s| s.to_string()).collect(),
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
        let authenticated = AuthenticatedClient {
            client,
            method: "none".to_string(),
            certificate_thumbprint: None,
        };
        let issued = issue_token_set(&state, &authenticated, &context).await.unwrap();
        (state, issued.response.access_token)
    }

    #[tokio::test]
    async fn claims_are_bounded_by_scope() {
        let (state, token) = state_and_token(&["openid", "email"]).await;
        let response = handle_userinfo(&state, &token, None).await.unwrap();
        let UserInfoResponse::Json(body) = response else {
            panic!("expected JSON");
        };
        assert_eq!(body["sub"], "user-1");
        assert_eq!(body["email"], "u@example.com");
        // The profile scope was not granted; `name` must be withheld.
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn missing_openid_scope_is_insufficient_scope() {
        let (state, token) = state_and_token(&["email"]).await;
        let err = handle_userinfo(&state, &token, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientScope);
    }

    #[tokio::test]
    async fn garbage_token_is_invalid_token() {
        let (state, _) = state_and_token(&["openid"]).await;
        let err = handle_userinfo(&state, "not-a-jwt", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }
}
