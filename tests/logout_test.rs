// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for end-session and back-channel logout
//!
//! A session with participating clients is ended; the engine must POST a
//! signed logout token to the registered back-channel URI, collect the
//! front-channel iframe URI, honor the post-logout redirect allowlist,
//! and survive an unreachable back-channel target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_oidc_server::config::Config;
use rust_oidc_server::jwt::TokenValidator;
use rust_oidc_server::oidc::endsession::{handle_end_session, BACKCHANNEL_LOGOUT_EVENT};
use rust_oidc_server::oidc::OidcState;
use rust_oidc_server::utility::{OutboundFetcher, SsrfPolicy};

async fn test_state(backchannel_uri: &str) -> OidcState {
    let yaml = format!(
        r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "rp-back"
      redirect_uris: ["https://rp-back.test/cb"]
      post_logout_redirect_uris: ["https://rp-back.test/bye"]
      backchannel_logout_uri: "{backchannel_uri}"
      token_endpoint_auth_method: "none"
    - client_id: "rp-front"
      redirect_uris: ["https://rp-front.test/cb"]
      frontchannel_logout_uri: "https://rp-front.test/logout"
      token_endpoint_auth_method: "none"
"#
    );
    let config = Config::from_yaml(&yaml).unwrap();
    OidcState::from_config(Arc::new(config))
        .unwrap()
        .with_fetcher(OutboundFetcher::new(SsrfPolicy {
            allow_insecure_loopback: true,
            max_response_bytes: 64 * 1024,
            timeout: Duration::from_secs(2),
        }))
}

async fn seed_session(state: &OidcState) {
    state.sessions.upsert("sess-9", "alice").await;
    state.sessions.add_client("sess-9", "rp-back").await;
    state.sessions.add_client("sess-9", "rp-front").await;
}

#[tokio::test]
async fn logout_notifies_both_channels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backchannel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&format!("{}/backchannel", server.uri())).await;
    seed_session(&state).await;

    let mut params = HashMap::new();
    params.insert("client_id".to_string(), "rp-back".to_string());
    params.insert(
        "post_logout_redirect_uri".to_string(),
        "https://rp-back.test/bye".to_string(),
    );
    params.insert("state".to_string(), "xyz".to_string());

    let outcome = handle_end_session(&state, &params, Some("sess-9"))
        .await
        .unwrap();

    assert_eq!(outcome.ended_session_id.as_deref(), Some("sess-9"));
    assert_eq!(
        outcome.redirect_uri.as_deref(),
        Some("https://rp-back.test/bye?state=xyz")
    );
    assert_eq!(outcome.frontchannel_logout_uris.len(), 1);
    let frame = &outcome.frontchannel_logout_uris[0];
    assert!(frame.starts_with("https://rp-front.test/logout?"));
    assert!(frame.contains("sid=sess-9"));

    // Inspect the delivered logout token.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let fields: HashMap<String, String> = serde_urlencoded::from_str(&body).unwrap();
    let logout_token = fields.get("logout_token").expect("logout_token field");

    let verified = TokenValidator::new(state.clock.clone())
        .with_issuer("https://auth.test")
        .with_audience("rp-back")
        .validate(logout_token, &state.keys.verification_keys())
        .unwrap();
    assert_eq!(verified.claims.sub(), Some("alice"));
    assert_eq!(verified.claims.get_str("sid"), Some("sess-9"));
    assert!(verified
        .claims
        .get("events")
        .and_then(|e| e.get(BACKCHANNEL_LOGOUT_EVENT))
        .is_some());
}

#[tokio::test]
async fn unreachable_backchannel_does_not_fail_logout() {
    // Nothing listens on this port; delivery must fail quietly.
    let state = test_state("http://127.0.0.1:1/backchannel").await;
    seed_session(&state).await;

    let outcome = handle_end_session(&state, &HashMap::new(), Some("sess-9"))
        .await
        .unwrap();
    assert_eq!(outcome.ended_session_id.as_deref(), Some("sess-9"));
    assert!(state.sessions.get("sess-9").await.is_none());
}

#[tokio::test]
async fn unregistered_post_logout_redirect_is_rejected() {
    let state = test_state("https://unused.test/bc").await;
    seed_session(&state).await;

    let mut params = HashMap::new();
    params.insert("client_id".to_string(), "rp-back".to_string());
    params.insert(
        "post_logout_redirect_uri".to_string(),
        "https://evil.test/phish".to_string(),
    );
    assert!(handle_end_session(&state, &params, Some("sess-9"))
        .await
        .is_err());
}
