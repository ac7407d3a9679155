// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Client authentication
//!
//! The token, introspection, revocation, PAR, CIBA and device endpoints
//! authenticate the calling client before anything else. The engine picks
//! the authenticator matching the client's registered
//! `token_endpoint_auth_method`; credentials for a different method yield
//! a "method not attempted" failure so operators can tell a wrong method
//! from wrong credentials in the logs.
//!
//! Supported methods: `client_secret_basic`, `client_secret_post`,
//! `client_secret_jwt`, `private_key_jwt`, `tls_client_auth`,
//! `self_signed_tls_client_auth`, `none`.

use jsonwebtoken::Algorithm;
use log::debug;

use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::jwt::{JwkKeySet, TokenValidator};
use crate::store::ClientInfo;
use crate::utility::hash::x5t_s256;

/// Client assertion type of RFC 7523 §2.2.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Credentials extracted from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ClientRequest {
    /// `client_id` form parameter.
    pub client_id: Option<String>,

    /// Credentials from the `Authorization: Basic` header.
    pub basic: Option<(String, String)>,

    /// `client_secret` form parameter.
    pub client_secret: Option<String>,

    /// `client_assertion` form parameter.
    pub client_assertion: Option<String>,

    /// `client_assertion_type` form parameter.
    pub client_assertion_type: Option<String>,

    /// PEM-encoded TLS client certificate forwarded by the TLS terminator.
    pub client_certificate: Option<String>,
}

impl ClientRequest {
    /// The client identifier claimed by the request, wherever it appears.
    pub fn claimed_client_id(&self) -> Option<String> {
        if let Some((id, _)) = &self.basic {
            return Some(id.clone());
        }
        if let Some(id) = &self.client_id {
            return Some(id.clone());
        }
        // private_key_jwt / client_secret_jwt clients may send only the
        // assertion; its unverified iss names the client.
        self.client_assertion
            .as_deref()
            .and_then(unverified_assertion_issuer)
    }
}

/// A successfully authenticated client.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub client: ClientInfo,

    /// Method that succeeded.
    pub method: String,

    /// SHA-256 thumbprint of the presented TLS certificate, for
    /// certificate-bound tokens (RFC 8705).
    pub certificate_thumbprint: Option<String>,
}

/// Authenticate the client behind `request`.
pub async fn authenticate_client(
    state: &OidcState,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    let client_id = request.claimed_client_id().ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidClient, "No client identification presented")
    })?;

    let client = state.clients.get(&client_id).ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidClient, "Unknown client")
    })?;

    let method = client.token_endpoint_auth_method.clone();
    debug!("Authenticating client {client_id:?} with method {method:?}");

    let result = match method.as_str() {
        "client_secret_basic" => authenticate_secret_basic(&client, request),
        "client_secret_post" => authenticate_secret_post(&client, request),
        "client_secret_jwt" => authenticate_secret_jwt(state, &client, request).await,
        "private_key_jwt" => authenticate_private_key_jwt(state, &client, request).await,
        "tls_client_auth" => authenticate_tls(&client, request, false),
        "self_signed_tls_client_auth" => authenticate_tls(&client, request, true),
        "none" => authenticate_none(&client, request),
        other => Err(OidcError::validate(
            ErrorCode::InvalidClient,
            format!("Client registers unsupported authentication method {other:?}"),
        )),
    }?;

    Ok(result)
}

/// `client_secret_basic`: credentials in the `Authorization` header.
fn authenticate_secret_basic(
    client: &ClientInfo,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    let Some((_, secret)) = &request.basic else {
        return Err(method_not_attempted("client_secret_basic"));
    };
    verify_secret(client, secret)?;
    Ok(authenticated(client, "client_secret_basic", None))
}

/// `client_secret_post`: credentials in the form body.
fn authenticate_secret_post(
    client: &ClientInfo,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    let Some(secret) = &request.client_secret else {
        return Err(method_not_attempted("client_secret_post"));
    };
    verify_secret(client, secret)?;
    Ok(authenticated(client, "client_secret_post", None))
}

/// `client_secret_jwt`: HMAC assertion keyed with the client secret.
async fn authenticate_secret_jwt(
    state: &OidcState,
    client: &ClientInfo,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    let assertion = require_assertion(request, "client_secret_jwt")?;
    let secret = client.client_secret.as_ref().ok_or_else(|| {
        OidcError::validate(
            ErrorCode::InvalidClient,
            "Client has no secret configured for HMAC assertions",
        )
    })?;

    let keys = [
        crate::jwt::SigningKey::new_symmetric(secret.as_bytes(), "HS256"),
        crate::jwt::SigningKey::new_symmetric(secret.as_bytes(), "HS384"),
        crate::jwt::SigningKey::new_symmetric(secret.as_bytes(), "HS512"),
    ];
    let mut verification = Vec::new();
    for key in keys.into_iter().flatten() {
        // The assertion names no kid for a shared secret; match on alg.
        let mut vks = key.verification_keys();
        for vk in &mut vks {
            vk.kid = None;
        }
        verification.extend(vks);
    }

    verify_assertion_claims(state, client, assertion, &verification).await?;
    Ok(authenticated(client, "client_secret_jwt", None))
}

/// `private_key_jwt`: assertion signed with a key from the client's JWKS.
async fn authenticate_private_key_jwt(
    state: &OidcState,
    client: &ClientInfo,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    let assertion = require_assertion(request, "private_key_jwt")?;
    let jwks = client_jwks(state, client).await?;

    let header = jsonwebtoken::decode_header(assertion).map_err(|_| {
        OidcError::validate(ErrorCode::InvalidClient, "Client assertion is malformed")
    })?;
    let fallback = format!("{:?}", header.alg);
    let verification = jwks.verification_keys(Some(&fallback));

    verify_assertion_claims(state, client, assertion, &verification).await?;
    Ok(authenticated(client, "private_key_jwt", None))
}

/// `tls_client_auth` and `self_signed_tls_client_auth`.
fn authenticate_tls(
    client: &ClientInfo,
    request: &ClientRequest,
    self_signed: bool,
) -> Result<AuthenticatedClient, OidcError> {
    let method = if self_signed {
        "self_signed_tls_client_auth"
    } else {
        "tls_client_auth"
    };
    let Some(pem) = &request.client_certificate else {
        return Err(method_not_attempted(method));
    };

    let (_, parsed_pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).map_err(|_| {
        OidcError::validate(ErrorCode::InvalidClient, "Client certificate is not valid PEM")
    })?;
    let der = parsed_pem.contents.clone();
    let (_, certificate) = x509_parser::parse_x509_certificate(&der).map_err(|_| {
        OidcError::validate(ErrorCode::InvalidClient, "Client certificate does not parse")
    })?;

    if self_signed {
        // The certificate must correspond to a key the client registered.
        let thumbprint = x5t_s256(&der);
        let registered = client
            .jwks
            .as_ref()
            .map(|jwks| jwks_contains_certificate(jwks, &thumbprint))
            .unwrap_or(false);
        if !registered {
            return Err(OidcError::validate(
                ErrorCode::InvalidClient,
                "Presented certificate matches no registered key",
            ));
        }
    } else {
        let mut matched = false;
        if let Some(expected_dn) = &client.tls_client_auth_subject_dn {
            matched = &certificate.subject().to_string() == expected_dn;
        }
        if !matched {
            if let Some(expected_dns) = &client.tls_client_auth_san_dns {
                matched = certificate_san_dns(&certificate)
                    .iter()
                    .any(|d| d == expected_dns);
            }
        }
        if !matched {
            if let Some(expected_uri) = &client.tls_client_auth_san_uri {
                matched = certificate_san_uris(&certificate)
                    .iter()
                    .any(|u| u == expected_uri);
            }
        }
        if !matched {
            return Err(OidcError::validate(
                ErrorCode::InvalidClient,
                "Certificate does not match the registered TLS metadata",
            ));
        }
    }

    Ok(authenticated(client, method, Some(x5t_s256(&der))))
}

/// `none`: public clients. Any presented credential is a mismatch.
fn authenticate_none(
    client: &ClientInfo,
    request: &ClientRequest,
) -> Result<AuthenticatedClient, OidcError> {
    if request.basic.is_some() || request.client_secret.is_some() {
        return Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Public client must not present credentials",
        ));
    }
    Ok(authenticated(client, "none", None))
}

fn authenticated(
    client: &ClientInfo,
    method: &str,
    certificate_thumbprint: Option<String>,
) -> AuthenticatedClient {
    AuthenticatedClient {
        client: client.clone(),
        method: method.to_string(),
        certificate_thumbprint,
    }
}

fn method_not_attempted(method: &str) -> OidcError {
    OidcError::validate(
        ErrorCode::InvalidClient,
        format!("Authentication method {method} not attempted"),
    )
}

fn verify_secret(client: &ClientInfo, presented: &str) -> Result<(), OidcError> {
    let hash = client.client_secret_hash.as_ref().ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidClient, "Client has no secret registered")
    })?;
    if pwhash::unix::verify(presented, hash) {
        Ok(())
    } else {
        Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Invalid client credentials",
        ))
    }
}

fn require_assertion<'r>(
    request: &'r ClientRequest,
    method: &str,
) -> Result<&'r str, OidcError> {
    match (&request.client_assertion, &request.client_assertion_type) {
        (Some(assertion), Some(assertion_type)) if assertion_type == JWT_BEARER_ASSERTION_TYPE => {
            Ok(assertion)
        }
        (Some(_), Some(_)) => Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Unsupported client_assertion_type",
        )),
        _ => Err(method_not_attempted(method)),
    }
}

/// Claim checks shared by both assertion methods (RFC 7523 §3):
/// `iss == sub == client_id`, `aud` names this issuer, `exp` in the
/// future, fresh `jti`.
async fn verify_assertion_claims(
    state: &OidcState,
    client: &ClientInfo,
    assertion: &str,
    verification: &[crate::jwt::VerificationKey],
) -> Result<(), OidcError> {
    let validator = TokenValidator::new(state.clock.clone())
        .with_issuer(client.client_id.clone())
        .with_algorithms(vec![
            Algorithm::HS256,
            Algorithm::HS384,
            Algorithm::HS512,
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
            Algorithm::ES256,
            Algorithm::ES384,
        ]);

    let verified = validator.validate(assertion, verification).map_err(|e| {
        OidcError::validate(ErrorCode::InvalidClient, format!("Client assertion: {e}"))
    })?;

    if verified.claims.sub() != Some(client.client_id.as_str()) {
        return Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Assertion sub must equal client_id",
        ));
    }

    let issuer = state.issuer();
    let token_endpoint = state.endpoint_url("token").unwrap_or_default();
    let aud_ok = verified
        .claims
        .aud()
        .iter()
        .any(|aud| aud == issuer || *aud == token_endpoint);
    if !aud_ok {
        return Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Assertion audience does not name this issuer",
        ));
    }

    let jti = verified.claims.jti().ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidClient, "Assertion carries no jti")
    })?;
    let exp = verified
        .claims
        .exp()
        .ok_or_else(|| OidcError::validate(ErrorCode::InvalidClient, "Assertion carries no exp"))?;
    if !state.replay.check_and_store(&format!("ca:{jti}"), exp).await {
        return Err(OidcError::validate(
            ErrorCode::InvalidClient,
            "Assertion jti was already used",
        ));
    }

    Ok(())
}

/// The client's key set: by value, or fetched from its `jwks_uri`.
async fn client_jwks(state: &OidcState, client: &ClientInfo) -> Result<JwkKeySet, OidcError> {
    if let Some(jwks) = &client.jwks {
        return Ok(jwks.clone());
    }
    if let Some(uri) = &client.jwks_uri {
        return state.jwks_client.get(uri).await.map_err(|e| {
            OidcError::validate(
                ErrorCode::InvalidClient,
                format!("Client JWKS could not be retrieved: {e}"),
            )
        });
    }
    Err(OidcError::validate(
        ErrorCode::InvalidClient,
        "Client registers no JWKS",
    ))
}

fn jwks_contains_certificate(jwks: &JwkKeySet, thumbprint: &str) -> bool {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    jwks.keys.iter().any(|key| {
        let x5c = match key {
            crate::jwt::JsonWebKey::Rsa(p) => p.x5c.as_ref(),
            crate::jwt::JsonWebKey::Ec(p) => p.x5c.as_ref(),
            crate::jwt::JsonWebKey::Oct(_) => None,
        };
        x5c.and_then(|chain| chain.first())
            .and_then(|leaf| STANDARD.decode(leaf).ok())
            .map(|der| x5t_s256(&der) == thumbprint)
            .unwrap_or(false)
    })
}

/// Read the unverified `iss` of an assertion, for client resolution only.
fn unverified_assertion_issuer(assertion: &str) -> Option<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = assertion.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    value.get("iss")?.as_str().map(str::to_string)
}

fn certificate_san_dns(certificate: &x509_parser::certificate::X509Certificate<'_>) -> Vec<String> {
    san_names(certificate)
        .into_iter()
        .filter_map(|name| match name {
            x509_parser::extensions::GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect()
}

fn certificate_san_uris(certificate: &x509_parser::certificate::X509Certificate<'_>) -> Vec<String> {
    san_names(certificate)
        .into_iter()
        .filter_map(|name| match name {
            x509_parser::extensions::GeneralName::URI(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect()
}

fn san_names<'a>(
    certificate: &'a x509_parser::certificate::X509Certificate<'a>,
) -> Vec<x509_parser::extensions::GeneralName<'a>> {
    certificate
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| ext.value.general_names.clone())
        .unwrap_or_default()
}
