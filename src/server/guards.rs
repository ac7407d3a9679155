// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request guards
//!
//! Extraction of client credentials, bearer tokens, the forwarded TLS
//! client certificate and the authenticated end-user session from the
//! HTTP request. Guards only extract; verification happens in the engine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::oidc::client_auth::ClientRequest;
use crate::oidc::AuthSession;
use crate::utility::hash::x5t_s256;

/// Header a TLS-terminating proxy forwards the client certificate in,
/// URL-encoded PEM.
pub const CLIENT_CERT_HEADER: &str = "x-ssl-client-cert";

/// Partial [`ClientRequest`] from the header surface; handlers merge the
/// form fields in before calling the engine.
pub struct ClientCredentials(pub ClientRequest);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientCredentials {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let mut credentials = ClientRequest::default();

        if let Some(authorization) = request.headers().get_one("Authorization") {
            if let Some(encoded) = authorization.strip_prefix("Basic ") {
                if let Some((id, secret)) = decode_basic(encoded) {
                    credentials.basic = Some((id, secret));
                }
            }
        }

        if let Some(raw) = request.headers().get_one(CLIENT_CERT_HEADER) {
            let pem = urlencoding_decode(raw);
            if pem.contains("BEGIN CERTIFICATE") {
                credentials.client_certificate = Some(pem);
            }
        }

        Outcome::Success(ClientCredentials(credentials))
    }
}

impl ClientCredentials {
    /// Merge the credential-bearing form fields into the guard result.
    pub fn with_form(mut self, form: &std::collections::HashMap<String, String>) -> ClientRequest {
        let take = |name: &str| form.get(name).cloned().filter(|v| !v.is_empty());
        self.0.client_id = take("client_id");
        self.0.client_secret = take("client_secret");
        self.0.client_assertion = take("client_assertion");
        self.0.client_assertion_type = take("client_assertion_type");
        self.0
    }
}

/// Raw bearer token from the `Authorization` header.
pub struct BearerToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(token) if !token.is_empty() => Outcome::Success(BearerToken(token.to_string())),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// SHA-256 thumbprint of the forwarded TLS client certificate, when one
/// is on the connection. Used to check `cnf`-bound tokens.
pub struct PresentedCertificate(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PresentedCertificate {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let thumbprint = request
            .headers()
            .get_one(CLIENT_CERT_HEADER)
            .map(urlencoding_decode)
            .and_then(|pem| {
                x509_parser::pem::parse_x509_pem(pem.as_bytes())
                    .ok()
                    .map(|(_, parsed)| x5t_s256(&parsed.contents))
            });
        Outcome::Success(PresentedCertificate(thumbprint))
    }
}

/// The authenticated end-user session, decoded from the private session
/// cookie the host's login flow sets.
pub struct AuthenticatedSession(pub AuthSession);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cookie_name = request
            .rocket()
            .state::<std::sync::Arc<crate::oidc::OidcState>>()
            .map(|s| s.config.server.session_cookie_name.clone())
            .unwrap_or_else(|| "op_session".to_string());

        if let Some(cookie) = request.cookies().get_private(&cookie_name) {
            if let Some(session) = decode_session(cookie.value()) {
                return Outcome::Success(AuthenticatedSession(session));
            }
            log::debug!("Session cookie present but undecodable");
        }
        Outcome::Forward(Status::Unauthorized)
    }
}

/// Encode an [`AuthSession`] for the session cookie. The host's login
/// flow calls this after authenticating the user.
pub fn encode_session(session: &AuthSession) -> String {
    STANDARD.encode(serde_json::to_vec(session).expect("session serializes"))
}

fn decode_session(value: &str) -> Option<AuthSession> {
    let raw = STANDARD.decode(value).ok()?;
    serde_json::from_slice(&raw).ok()
}

fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let raw = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (id, secret) = text.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Minimal percent-decoding for the forwarded certificate header.
fn urlencoding_decode(raw: &str) -> String {
    serde_urlencoded::from_str::<Vec<(String, String)>>(&format!("v={}", raw.replace('+', "%2B")))
        .ok()
        .and_then(|pairs| pairs.into_iter().next())
        .map(|(_, v)| v)
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_decode() {
        let encoded = STANDARD.encode("app:s3cr3t");
        assert_eq!(
            decode_basic(&encoded),
            Some(("app".to_string(), "s3cr3t".to_string()))
        );
    }

    #[test]
    fn session_roundtrip() {
        let session = AuthSession {
            subject: "user-1".to_string(),
            auth_time: chrono::Utc::now(),
            acr: None,
            amr: vec!["pwd".to_string()],
            session_id: "sid-1".to_string(),
        };
        let decoded = decode_session(&encode_session(&session)).unwrap();
        assert_eq!(decoded.subject, "user-1");
        assert_eq!(decoded.session_id, "sid-1");
    }
}
