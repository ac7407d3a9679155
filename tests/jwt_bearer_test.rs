// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for the JWT-bearer assertion grant (RFC 7523)
//!
//! A trusted issuer's JWKS is served from a wiremock server; assertions
//! signed with the matching RSA key exchange for access tokens, and a
//! replayed `jti` is rejected with `invalid_grant`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::client_auth::ClientRequest;
use rust_oidc_server::oidc::error::ErrorCode;
use rust_oidc_server::oidc::token::{handle_token_request, GRANT_JWT_BEARER};
use rust_oidc_server::oidc::OidcState;
use rust_oidc_server::utility::{OutboundFetcher, SsrfPolicy};

struct TrustedIssuer {
    encoding_key: EncodingKey,
    kid: String,
    jwks_json: serde_json::Value,
}

fn make_issuer_keys() -> TrustedIssuer {
    let mut rng = rsa::rand_core::OsRng;
    let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = rsa::RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .unwrap();
    let kid = "partner-key-1".to_string();
    let jwks_json = serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }]
    });

    TrustedIssuer {
        encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
        kid,
        jwks_json,
    }
}

async fn test_state(jwks_url: &str) -> OidcState {
    let yaml = format!(
        r#"
server:
  issuer: "https://auth.test"
access:
  clients:
    - client_id: "partner-service"
      grant_types: ["urn:ietf:params:oauth:grant-type:jwt-bearer"]
      scopes: ["openid", "api.read"]
      token_endpoint_auth_method: "none"
  scopes:
    - name: "api.read"
  trusted_issuers:
    - issuer: "https://partner.test"
      jwks_uri: "{jwks_url}"
      client_id: "partner-service"
"#
    );
    let config = Config::from_yaml(&yaml).unwrap();
    OidcState::from_config(Arc::new(config))
        .unwrap()
        .with_fetcher(OutboundFetcher::new(SsrfPolicy {
            allow_insecure_loopback: true,
            max_response_bytes: 64 * 1024,
            timeout: Duration::from_secs(5),
        }))
}

fn assertion(issuer: &TrustedIssuer, jti: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": "https://partner.test",
        "sub": "service-account-1",
        "aud": "https://auth.test",
        "iat": now,
        "exp": now + 300,
        "jti": jti,
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(issuer.kid.clone());
    jsonwebtoken::encode(&header, &claims, &issuer.encoding_key).unwrap()
}

fn bearer_form(assertion_jwt: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    form.insert("grant_type".to_string(), GRANT_JWT_BEARER.to_string());
    form.insert("assertion".to_string(), assertion_jwt.to_string());
    form.insert("client_id".to_string(), "partner-service".to_string());
    form.insert("scope".to_string(), "api.read".to_string());
    form
}

fn client() -> ClientRequest {
    ClientRequest {
        client_id: Some("partner-service".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn assertion_exchanges_for_tokens_and_replay_is_rejected() {
    let issuer = make_issuer_keys();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issuer.jwks_json.clone()))
        .mount(&server)
        .await;

    let state = test_state(&format!("{}/jwks", server.uri())).await;
    let jwt = assertion(&issuer, "assert-1");

    let tokens = handle_token_request(&state, &client(), &bearer_form(&jwt))
        .await
        .unwrap();
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope.as_deref(), Some("api.read"));

    // The exact same assertion replays its jti and must fail.
    let err = handle_token_request(&state, &client(), &bearer_form(&jwt))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);

    // A fresh jti from the same issuer works again.
    let jwt2 = assertion(&issuer, "assert-2");
    handle_token_request(&state, &client(), &bearer_form(&jwt2))
        .await
        .unwrap();
}

#[tokio::test]
async fn untrusted_issuer_is_rejected() {
    let issuer = make_issuer_keys();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issuer.jwks_json.clone()))
        .mount(&server)
        .await;
    let state = test_state(&format!("{}/jwks", server.uri())).await;

    // Same key, wrong iss claim.
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": "https://rogue.test",
        "sub": "service-account-1",
        "aud": "https://auth.test",
        "exp": now + 300,
        "jti": "rogue-1",
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(issuer.kid.clone());
    let jwt = jsonwebtoken::encode(&header, &claims, &issuer.encoding_key).unwrap();

    let err = handle_token_request(&state, &client(), &bearer_form(&jwt))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn tampered_assertion_fails_signature() {
    let issuer = make_issuer_keys();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issuer.jwks_json.clone()))
        .mount(&server)
        .await;
    let state = test_state(&format!("{}/jwks", server.uri())).await;

    let mut jwt = assertion(&issuer, "assert-3");
    jwt.replace_range(jwt.len() - 6.., "AAAAAA");
    let err = handle_token_request(&state, &client(), &bearer_form(&jwt))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidGrant);
}
