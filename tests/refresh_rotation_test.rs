// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for refresh token rotation
//!
//! A code redeemed with `offline_access` yields a refresh token. Using it
//! mints a fresh access token and (under rotation) a fresh refresh token;
//! the old one is marked `Used` and any reuse fails with `invalid_grant`.

use std::collections::HashMap;
use std::sync::Arc;

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::client_auth::{AuthenticatedClient, ClientRequest};
use rust_oidc_server::oidc::context::AuthorizationContext;
use rust_oidc_server::oidc::error::ErrorCode;
use rust_oidc_server::oidc::token::{handle_token_request, issue_token_set, TokenResponse};
use rust_oidc_server::oidc::OidcState;

fn test_state(rotation: bool) -> OidcState {
    let yaml = format!(
        r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "web-app"
      redirect_uris: ["https://app.test/cb"]
      grant_types: ["authorization_code", "refresh_token"]
      scopes: ["openid", "offline_access"]
      allow_offline_access: true
      refresh_token_rotation: {rotation}
      token_endpoint_auth_method: "none"
"#
    );
    let config = Config::from_yaml(&yaml).unwrap();
    OidcState::from_config(Arc::new(config)).unwrap()
}

async fn initial_tokens(state: &OidcState) -> TokenResponse {
    let client = state.clients.get("web-app").unwrap();
    let context = AuthorizationContext {
        subject: Some("alice".to_string()),
        client_id: "web-app".to_string(),
        scopes: vec!["openid".to_string(), "offline_access".to_string()],
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
    issue_token_set(state, &authenticated, &context)
        .await
        .unwrap()
        .response
}

fn refresh_form(token: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), "refresh_token".to_string());
    form.insert("refresh_token".to_string(), token.to_string());
    form.insert("client_id".to_string(), "web-app".to_string());
    form
}

fn client() -> ClientRequest {
    ClientRequest {
        client_id: Some("web-app".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn rotation_issues_new_refresh_token_and_burns_the_old() {
    let state = test_state(true);
    let initial = initial_tokens(&state).await;
    let old_refresh = initial.refresh_token.expect("offline_access grants refresh");

    let rotated = handle_token_request(&state, &client(), &refresh_form(&old_refresh))
        .await
        .unwrap();
    let new_refresh = rotated.refresh_token.expect("rotation returns a new token");
    assert_ne!(new_refresh, old_refresh);
    assert_ne!(rotated.access_token, initial.access_token);

    // The old token was rotated out; reuse is invalid_grant.
    let err = handle_token_request(&state, &client(), &refresh_form(&old_refresh))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);

    // The new one still works.
    handle_token_request(&state, &client(), &refresh_form(&new_refresh))
        .await
        .unwrap();
}

#[tokio::test]
async fn without_rotation_the_same_token_stays_valid() {
    let state = test_state(false);
    let initial = initial_tokens(&state).await;
    let refresh = initial.refresh_token.unwrap();

    let first = handle_token_request(&state, &client(), &refresh_form(&refresh))
        .await
        .unwrap();
    assert_eq!(first.refresh_token.as_deref(), Some(refresh.as_str()));

    // Reuse is fine without rotation.
    handle_token_request(&state, &client(), &refresh_form(&refresh))
        .await
        .unwrap();
}

#[tokio::test]
async fn scope_narrowing_cannot_widen() {
    let state = test_state(true);
    let refresh = initial_tokens(&state).await.refresh_token.unwrap();

    let mut form = refresh_form(&refresh);
    form.insert("scope".to_string(), "openid profile".to_string());
    let err = handle_token_request(&state, &client(), &form)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidScope);
}

#[tokio::test]
async fn foreign_client_cannot_redeem() {
    let state = test_state(true);
    let refresh = initial_tokens(&state).await.refresh_token.unwrap();

    let other = ClientRequest {
        client_id: Some("other-app".to_string()),
        ..Default::default()
    };
    let err = handle_token_request(&state, &other, &refresh_form(&refresh))
        .await
        .unwrap_err();
    // Unknown client fails authentication before the grant is touched.
    assert_eq!(err.code, ErrorCode::InvalidClient);
}
