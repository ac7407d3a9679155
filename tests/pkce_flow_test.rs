// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for the authorization code flow with PKCE
//!
//! This test drives the full engine pipeline: authorization request with
//! an S256 challenge, code issuance, redemption with the verifier, and
//! the anti-replay behavior of a second redemption (which must fail and
//! revoke every token minted from the code).

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::authorize::{handle_authorization_request, AuthorizeOutcome};
use rust_oidc_server::oidc::client_auth::ClientRequest;
use rust_oidc_server::oidc::error::ErrorCode;
use rust_oidc_server::oidc::introspect::handle_introspection;
use rust_oidc_server::oidc::token::handle_token_request;
use rust_oidc_server::oidc::{AuthSession, OidcState};

/// RFC 7636 appendix B verifier.
const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

fn test_state() -> OidcState {
    let yaml = r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "web-app"
      redirect_uris: ["https://app.test/cb"]
      response_types: ["code"]
      grant_types: ["authorization_code", "refresh_token"]
      scopes: ["openid", "profile", "offline_access"]
      allow_offline_access: true
      token_endpoint_auth_method: "none"
"#;
    let config = Config::from_yaml(yaml).unwrap();
    OidcState::from_config(Arc::new(config)).unwrap()
}

fn user_session() -> AuthSession {
    AuthSession {
        subject: "alice".to_string(),
        auth_time: chrono::Utc::now(),
        acr: None,
        amr: vec!["pwd".to_string()],
        session_id: "sess-1".to_string(),
    }
}

fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

async fn obtain_code(state: &OidcState) -> String {
    let mut params = HashMap::new();
    params.insert("client_id".to_string(), "web-app".to_string());
    params.insert("redirect_uri".to_string(), "https://app.test/cb".to_string());
    params.insert("response_type".to_string(), "code".to_string());
    params.insert("scope".to_string(), "openid offline_access".to_string());
    params.insert("state".to_string(), "af0ifjsldkj".to_string());
    params.insert("code_challenge".to_string(), code_challenge(CODE_VERIFIER));
    params.insert("code_challenge_method".to_string(), "S256".to_string());

    let session = user_session();
    let outcome = handle_authorization_request(state, params, Some(&session))
        .await
        .unwrap();

    let AuthorizeOutcome::Redirect(location) = outcome else {
        panic!("expected redirect, got {outcome:?}");
    };
    let url = url::Url::parse(&location).unwrap();
    assert_eq!(url.origin().ascii_serialization(), "https://app.test");

    // state comes back verbatim alongside the code.
    let state_param = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string());
    assert_eq!(state_param.as_deref(), Some("af0ifjsldkj"));

    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .expect("authorization code in redirect")
}

fn redeem_form(code: &str, verifier: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), "authorization_code".to_string());
    form.insert("code".to_string(), code.to_string());
    form.insert("redirect_uri".to_string(), "https://app.test/cb".to_string());
    form.insert("client_id".to_string(), "web-app".to_string());
    form.insert("code_verifier".to_string(), verifier.to_string());
    form
}

fn public_client() -> ClientRequest {
    ClientRequest {
        client_id: Some("web-app".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn code_flow_with_s256_succeeds() {
    let state = test_state();
    let code = obtain_code(&state).await;

    let response = handle_token_request(&state, &public_client(), &redeem_form(&code, CODE_VERIFIER))
        .await
        .unwrap();

    assert_eq!(response.token_type, "Bearer");
    assert!(!response.access_token.is_empty());
    assert!(response.id_token.is_some(), "openid scope yields an id_token");
    assert!(
        response.refresh_token.is_some(),
        "offline_access yields a refresh token"
    );

    // Issued tokens verify against the published JWKS.
    let verified = rust_oidc_server::jwt::TokenValidator::new(state.clock.clone())
        .with_issuer("https://auth.test")
        .validate(&response.access_token, &state.keys.verification_keys())
        .unwrap();
    assert_eq!(verified.claims.sub(), Some("alice"));
    assert_eq!(verified.claims.client_id(), Some("web-app"));
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let state = test_state();
    let code = obtain_code(&state).await;

    let err = handle_token_request(
        &state,
        &public_client(),
        &redeem_form(&code, "wrong-verifier-wrong-verifier-wrong-verifier"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn second_redemption_fails_and_revokes_descendants() {
    let state = test_state();
    let code = obtain_code(&state).await;

    let first = handle_token_request(&state, &public_client(), &redeem_form(&code, CODE_VERIFIER))
        .await
        .unwrap();

    // Replay the code.
    let err = handle_token_request(&state, &public_client(), &redeem_form(&code, CODE_VERIFIER))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);

    // Every token from the first redemption is now revoked; introspection
    // reports active: false with no other fields.
    let inspector = ClientRequest {
        client_id: Some("web-app".to_string()),
        ..Default::default()
    };
    let mut introspect_form = HashMap::new();
    introspect_form.insert("token".to_string(), first.access_token.clone());
    let response = handle_introspection(&state, &inspector, &introspect_form)
        .await
        .unwrap();
    assert!(!response.active);
    assert!(response.sub.is_none());
    assert!(response.scope.is_none());
}

#[tokio::test]
async fn mismatched_redirect_uri_is_rejected() {
    let state = test_state();
    let code = obtain_code(&state).await;

    let mut form = redeem_form(&code, CODE_VERIFIER);
    form.insert(
        "redirect_uri".to_string(),
        "https://app.test/other".to_string(),
    );
    let err = handle_token_request(&state, &public_client(), &form)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);
}
