// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Request fetchers
//!
//! An authorization request may arrive inline, as a signed request object
//! (`request`, RFC 9101), by reference (`request_uri`), or as a pushed
//! request handle (RFC 9126). The fetchers run in sequence and produce one
//! canonical parameter map; the first failure aborts.
//!
//! Merge rule: claims of a verified request object win over inline
//! parameters. A pushed request replaces the inline set except for
//! `client_id`, which must match the pushing client.

use std::collections::HashMap;

use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::jwt::TokenValidator;
use crate::store::REQUEST_URI_PREFIX;

/// Resolve the effective authorization request.
pub async fn assemble_request(
    state: &OidcState,
    mut params: HashMap<String, String>,
) -> Result<HashMap<String, String>, OidcError> {
    let has_request = params.contains_key("request");
    let has_request_uri = params.contains_key("request_uri");

    if has_request && has_request_uri {
        return Err(OidcError::fetch(
            ErrorCode::InvalidRequest,
            "request and request_uri are mutually exclusive",
        ));
    }

    if let Some(request_uri) = params.get("request_uri").cloned() {
        if request_uri.starts_with(REQUEST_URI_PREFIX) {
            return resolve_pushed_request(state, &request_uri, params).await;
        }
        // By-reference request object, dereferenced with SSRF protection.
        let body = state.fetcher.fetch(&request_uri).await.map_err(|e| {
            OidcError::fetch(
                ErrorCode::InvalidRequest,
                format!("request_uri could not be dereferenced: {e}"),
            )
        })?;
        let jwt = String::from_utf8(body).map_err(|_| {
            OidcError::fetch(
                ErrorCode::InvalidRequest,
                "request_uri did not yield a request object",
            )
        })?;
        params.remove("request_uri");
        return merge_request_object(state, jwt.trim(), params).await;
    }

    if let Some(jwt) = params.remove("request") {
        return merge_request_object(state, &jwt, params).await;
    }

    Ok(params)
}

/// PAR fetcher: consume the stored record atomically and replay it.
async fn resolve_pushed_request(
    state: &OidcState,
    request_uri: &str,
    params: HashMap<String, String>,
) -> Result<HashMap<String, String>, OidcError> {
    let stored = state.par.consume(request_uri).await.ok_or_else(|| {
        OidcError::fetch(
            ErrorCode::InvalidRequest,
            "request_uri is unknown, expired or already used",
        )
    })?;

    if let Some(client_id) = params.get("client_id") {
        if client_id != &stored.client_id {
            return Err(OidcError::fetch(
                ErrorCode::InvalidRequest,
                "request_uri was pushed by a different client",
            ));
        }
    }

    let mut merged = params;
    merged.remove("request_uri");
    for (key, value) in stored.parameters {
        merged.insert(key, value);
    }
    merged.insert("client_id".to_string(), stored.client_id);
    Ok(merged)
}

/// Request-object fetcher: verify the JWT and merge its claims over the
/// inline parameters.
async fn merge_request_object(
    state: &OidcState,
    jwt: &str,
    params: HashMap<String, String>,
) -> Result<HashMap<String, String>, OidcError> {
    let client_id = params.get("client_id").cloned().ok_or_else(|| {
        OidcError::fetch(
            ErrorCode::InvalidRequest,
            "client_id is required alongside a request object",
        )
    })?;
    let client = state.clients.get(&client_id).ok_or_else(|| {
        OidcError::fetch(ErrorCode::InvalidRequest, "Unknown client")
    })?;

    let jwks = if let Some(jwks) = &client.jwks {
        jwks.clone()
    } else if let Some(uri) = &client.jwks_uri {
        state.jwks_client.get(uri).await.map_err(|e| {
            OidcError::fetch(
                ErrorCode::InvalidRequest,
                format!("Client JWKS could not be retrieved: {e}"),
            )
        })?
    } else {
        return Err(OidcError::fetch(
            ErrorCode::RequestNotSupported,
            "Client registers no keys for signed request objects",
        ));
    };

    let header = jsonwebtoken::decode_header(jwt).map_err(|_| {
        OidcError::fetch(ErrorCode::InvalidRequest, "Request object is malformed")
    })?;
    let fallback = format!("{:?}", header.alg);
    let verification = jwks.verification_keys(Some(&fallback));

    // iss must be the client, aud this issuer, lifetime bounded.
    let validator = TokenValidator::new(state.clock.clone())
        .with_issuer(client_id.clone())
        .with_audience(state.issuer().to_string());
    let verified = validator.validate(jwt, &verification).map_err(|e| {
        OidcError::fetch(
            ErrorCode::InvalidRequest,
            format!("Request object rejected: {e}"),
        )
    })?;

    let max_ttl = state.config.lifetimes.request_object_max_ttl;
    if let (Some(exp), Some(iat)) = (verified.claims.exp(), verified.claims.iat()) {
        if exp - iat > max_ttl {
            return Err(OidcError::fetch(
                ErrorCode::InvalidRequest,
                "Request object lifetime exceeds the allowed maximum",
            ));
        }
    }

    if let Some(embedded) = verified.claims.client_id() {
        if embedded != client_id {
            return Err(OidcError::fetch(
                ErrorCode::InvalidRequest,
                "Request object client_id does not match",
            ));
        }
    }

    let mut merged = params;
    for (key, value) in verified.claims.0 {
        // Registered JWT claims describe the object, not the request.
        if matches!(key.as_str(), "iss" | "aud" | "exp" | "nbf" | "iat" | "jti") {
            continue;
        }
        let as_string = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        merged.insert(key, as_string);
    }
    merged.insert("client_id".to_string(), client_id);
    Ok(merged)
}
