// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for the device authorization grant (RFC 8628)
//!
//! Drives the full state machine with a manual clock: initiation,
//! `authorization_pending` polling, `slow_down` on eager polling,
//! external approval, token issuance, and denial.

use std::collections::HashMap;
use std::sync::Arc;

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::client_auth::ClientRequest;
use rust_oidc_server::oidc::context::AuthorizationContext;
use rust_oidc_server::oidc::device::{
    approve_user_code, deny_user_code, handle_device_authorization,
};
use rust_oidc_server::oidc::error::ErrorCode;
use rust_oidc_server::oidc::token::{handle_token_request, GRANT_DEVICE_CODE};
use rust_oidc_server::oidc::OidcState;
use rust_oidc_server::utility::ManualClock;

fn test_state() -> (OidcState, ManualClock) {
    let clock = ManualClock::new(chrono::Utc::now());
    let yaml = r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "tv-app"
      grant_types: ["urn:ietf:params:oauth:grant-type:device_code"]
      scopes: ["openid"]
      token_endpoint_auth_method: "none"
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let state = OidcState::with_clock(Arc::new(config), Arc::new(clock.clone())).unwrap();
    (state, clock)
}

fn client() -> ClientRequest {
    ClientRequest {
        client_id: Some("tv-app".to_string()),
        ..Default::default()
    }
}

fn poll_form(device_code: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), GRANT_DEVICE_CODE.to_string());
    form.insert("device_code".to_string(), device_code.to_string());
    form.insert("client_id".to_string(), "tv-app".to_string());
    form
}

fn grant_for(user: &str) -> AuthorizationContext {
    AuthorizationContext {
        subject: Some(user.to_string()),
        client_id: "tv-app".to_string(),
        scopes: vec!["openid".to_string()],
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
    }
}

#[tokio::test]
async fn full_device_flow() {
    let (state, clock) = test_state();
    let mut form = HashMap::new();
    form.insert("scope".to_string(), "openid".to_string());

    let started = handle_device_authorization(&state, &client(), &form)
        .await
        .unwrap();
    assert_eq!(started.interval, 5);
    assert_eq!(started.expires_in, 300);

    // First poll: pending, and the interval window opens.
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthorizationPending);

    // Polling again inside the interval: slow_down.
    clock.advance(1);
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SlowDown);

    // Respect the interval, still pending.
    clock.advance(6);
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthorizationPending);

    // External approval through the user-code surface.
    approve_user_code(&state, &started.user_code, grant_for("bob"))
        .await
        .unwrap();

    clock.advance(6);
    let tokens = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap();
    assert_eq!(tokens.token_type, "Bearer");
    assert!(tokens.id_token.is_some());

    // The device code is consumed; another poll cannot redeem it again.
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExpiredToken);
}

#[tokio::test]
async fn denial_yields_access_denied() {
    let (state, clock) = test_state();
    let started = handle_device_authorization(&state, &client(), &HashMap::new())
        .await
        .unwrap();

    deny_user_code(&state, &started.user_code).await.unwrap();

    clock.advance(6);
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[tokio::test]
async fn expired_device_code_is_expired_token() {
    let (state, clock) = test_state();
    let started = handle_device_authorization(&state, &client(), &HashMap::new())
        .await
        .unwrap();

    clock.advance(301);
    let err = handle_token_request(&state, &client(), &poll_form(&started.device_code))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExpiredToken);
}

#[tokio::test]
async fn user_codes_draw_from_the_configured_alphabet() {
    let (state, _clock) = test_state();
    for _ in 0..8 {
        let started = handle_device_authorization(&state, &client(), &HashMap::new())
            .await
            .unwrap();
        for c in started.user_code.chars() {
            assert!(
                c == '-' || "BCDFGHJKLMNPQRSTVWXZ".contains(c),
                "unexpected character {c:?} in user code"
            );
        }
    }
}
