// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP-level integration test over the mounted Rocket instance
//!
//! Exercises the discovery surface, the public JWKS, the check-session
//! iframe and the token endpoint with `client_secret_basic`
//! authentication, using Rocket's local asynchronous client.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::Value;

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::OidcState;
use rust_oidc_server::server::build_rocket;

const CLIENT_SECRET: &str = "correct-horse-battery-staple";

async fn test_client() -> Client {
    let secret_hash = pwhash::sha512_crypt::hash(CLIENT_SECRET).unwrap();
    let yaml = format!(
        r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "machine"
      grant_types: ["client_credentials"]
      scopes: ["api.read"]
      token_endpoint_auth_method: "client_secret_basic"
      client_secret_hash: "{secret_hash}"
  scopes:
    - name: "api.read"
"#
    );
    let config = Arc::new(Config::from_yaml(&yaml).unwrap());
    let state = Arc::new(OidcState::from_config(config.clone()).unwrap());
    let rocket = build_rocket(config, state).await;
    Client::tracked(rocket).await.expect("valid rocket instance")
}

fn basic_auth(id: &str, secret: &str) -> Header<'static> {
    Header::new(
        "Authorization",
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}"))),
    )
}

#[rocket::async_test]
async fn discovery_document_is_served() {
    let client = test_client().await;
    let response = client
        .get("/.well-known/openid-configuration")
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::JSON));

    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["issuer"], "https://auth.test");
    assert_eq!(body["token_endpoint"], "https://auth.test/connect/token");
    assert_eq!(
        body["jwks_uri"],
        "https://auth.test/.well-known/jwks"
    );
    assert!(body["code_challenge_methods_supported"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v == "S256"));
}

#[rocket::async_test]
async fn jwks_exposes_only_public_components() {
    let client = test_client().await;
    let response = client.get("/.well-known/jwks").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    let keys = body["keys"].as_array().unwrap();
    assert!(!keys.is_empty());
    for key in keys {
        assert_eq!(key["kty"], "RSA");
        assert!(key.get("n").is_some());
        assert!(key.get("d").is_none(), "private exponent must be stripped");
        assert!(key.get("p").is_none());
    }
}

#[rocket::async_test]
async fn checksession_iframe_is_cacheable() {
    let client = test_client().await;
    let response = client.get("/connect/checksession").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(
        response.headers().get_one("Cache-Control"),
        Some("public, max-age=3600")
    );
    let body = response.into_string().await.unwrap();
    assert!(body.contains("postMessage"));
}

#[rocket::async_test]
async fn client_credentials_over_http() {
    let client = test_client().await;
    let response = client
        .post("/connect/token")
        .header(ContentType::Form)
        .header(basic_auth("machine", CLIENT_SECRET))
        .body("grant_type=client_credentials&scope=api.read")
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "api.read");
    assert!(body["access_token"].as_str().unwrap().contains('.'));
    assert!(body.get("refresh_token").is_none());
}

#[rocket::async_test]
async fn wrong_secret_is_401_with_challenge() {
    let client = test_client().await;
    let response = client
        .post("/connect/token")
        .header(ContentType::Form)
        .header(basic_auth("machine", "not-the-secret"))
        .body("grant_type=client_credentials")
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
    assert!(response.headers().get_one("WWW-Authenticate").is_some());
    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["error"], "invalid_client");
}

#[rocket::async_test]
async fn unknown_grant_type_is_rejected() {
    let client = test_client().await;
    let response = client
        .post("/connect/token")
        .header(ContentType::Form)
        .header(basic_auth("machine", CLIENT_SECRET))
        .body("grant_type=urn:example:unknown")
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["error"], "unauthorized_client");
}
