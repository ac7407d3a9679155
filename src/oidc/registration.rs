// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Dynamic client registration (RFC 7591 / RFC 7592)
//!
//! POST registers a client and issues a registration access token; the
//! GET/PUT/DELETE management surface authenticates with that token.
//! Registered metadata passes the same invariants as statically
//! configured clients, and a PUT rotates the registration access token.

use serde::{Deserialize, Serialize};

use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::config::ClientConfig;
use crate::store::ClientInfo;
use crate::utility::hash::sha256;
use crate::utility::random::opaque_token;

/// Client metadata accepted at registration (RFC 7591 §2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,

    /// Space-separated scope string, per the RFC's wire format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_identifier_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontchannel_logout_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backchannel_logout_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,
}

/// Registration response (RFC 7591 §3.2.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub client_id_issued_at: i64,
    pub client_secret_expires_at: i64,
    pub registration_access_token: String,
    pub registration_client_uri: String,

    #[serde(flatten)]
    pub metadata: ClientMetadata,
}

/// Register a new client.
pub async fn handle_registration(
    state: &OidcState,
    metadata: ClientMetadata,
) -> Result<RegistrationResponse, OidcError> {
    if state.is_endpoint_disabled("register") {
        return Err(OidcError::validate(
            ErrorCode::RegistrationNotSupported,
            "Dynamic registration is disabled",
        ));
    }
    validate_metadata(&metadata)?;

    let client_id = uuid::Uuid::new_v4().to_string();
    let auth_method = metadata
        .token_endpoint_auth_method
        .clone()
        .unwrap_or_else(|| "client_secret_basic".to_string());

    // Only secret-based methods get a secret.
    let client_secret = matches!(
        auth_method.as_str(),
        "client_secret_basic" | "client_secret_post" | "client_secret_jwt"
    )
    .then(|| opaque_token(24));

    let registration_access_token = opaque_token(32);

    let mut client = client_from_metadata(&client_id, &metadata, &auth_method)?;
    if let Some(secret) = &client_secret {
        client.client_secret_hash = Some(
            pwhash::sha512_crypt::hash(secret)
                .map_err(|e| OidcError::bug(&format!("secret hashing failed: {e}")))?,
        );
        // client_secret_jwt verifies an HMAC and needs the raw value.
        if auth_method == "client_secret_jwt" {
            client.client_secret = Some(secret.clone());
        }
    }
    client.registration_access_token_hash = Some(hash_token(&registration_access_token));

    if !state.clients.insert(client) {
        return Err(OidcError::bug("generated client_id collided"));
    }
    log::info!("Registered client {client_id:?} ({auth_method})");

    Ok(RegistrationResponse {
        registration_client_uri: management_uri(state, &client_id),
        client_id,
        client_secret,
        client_id_issued_at: state.clock.now_ts(),
        client_secret_expires_at: 0,
        registration_access_token,
        metadata,
    })
}

/// Read a registration (RFC 7592 §2.1).
pub async fn handle_registration_read(
    state: &OidcState,
    client_id: &str,
    bearer: &str,
) -> Result<ClientMetadata, OidcError> {
    let client = authorize_management(state, client_id, bearer)?;
    Ok(metadata_from_client(&client))
}

/// Update a registration (RFC 7592 §2.2). Rotates the registration access
/// token.
pub async fn handle_registration_update(
    state: &OidcState,
    client_id: &str,
    bearer: &str,
    metadata: ClientMetadata,
) -> Result<RegistrationResponse, OidcError> {
    let existing = authorize_management(state, client_id, bearer)?;
    validate_metadata(&metadata)?;

    let auth_method = metadata
        .token_endpoint_auth_method
        .clone()
        .unwrap_or_else(|| existing.token_endpoint_auth_method.clone());

    let mut updated = client_from_metadata(client_id, &metadata, &auth_method)?;
    // Credentials survive the update; only metadata changes.
    updated.client_secret_hash = existing.client_secret_hash.clone();
    updated.client_secret = existing.client_secret.clone();

    let registration_access_token = opaque_token(32);
    updated.registration_access_token_hash = Some(hash_token(&registration_access_token));

    if !state.clients.update(updated) {
        return Err(OidcError::bug("managed client vanished during update"));
    }

    Ok(RegistrationResponse {
        registration_client_uri: management_uri(state, client_id),
        client_id: client_id.to_string(),
        client_secret: None,
        client_id_issued_at: state.clock.now_ts(),
        client_secret_expires_at: 0,
        registration_access_token,
        metadata,
    })
}

/// Delete a registration (RFC 7592 §2.3).
pub async fn handle_registration_delete(
    state: &OidcState,
    client_id: &str,
    bearer: &str,
) -> Result<(), OidcError> {
    authorize_management(state, client_id, bearer)?;
    state.clients.remove(client_id);
    log::info!("Deleted client registration {client_id:?}");
    Ok(())
}

/// Resolve the client and check the registration access token.
fn authorize_management(
    state: &OidcState,
    client_id: &str,
    bearer: &str,
) -> Result<ClientInfo, OidcError> {
    let client = state.clients.get(client_id).ok_or_else(|| {
        OidcError::validate(ErrorCode::InvalidToken, "Unknown client")
    })?;
    let expected = client.registration_access_token_hash.as_deref().ok_or_else(|| {
        OidcError::validate(
            ErrorCode::InvalidToken,
            "Client is not dynamically managed",
        )
    })?;
    if hash_token(bearer) != expected {
        return Err(OidcError::validate(
            ErrorCode::InvalidToken,
            "Invalid registration access token",
        ));
    }
    Ok(client)
}

fn validate_metadata(metadata: &ClientMetadata) -> Result<(), OidcError> {
    if metadata.id_token_encrypted_response_alg.is_some() {
        return Err(OidcError::validate(
            ErrorCode::InvalidClientMetadata,
            "ID token encryption is not supported by this server",
        ));
    }
    Ok(())
}

/// Build the internal record, running the shared client invariants.
fn client_from_metadata(
    client_id: &str,
    metadata: &ClientMetadata,
    auth_method: &str,
) -> Result<ClientInfo, OidcError> {
    let mut config: ClientConfig = serde_yml::from_str(&format!("client_id: {client_id}"))
        .map_err(|e| OidcError::bug(&format!("client scaffold failed: {e}")))?;

    config.redirect_uris = metadata.redirect_uris.clone();
    config.post_logout_redirect_uris = metadata.post_logout_redirect_uris.clone();
    if !metadata.response_types.is_empty() {
        config.response_types = metadata.response_types.clone();
    }
    if !metadata.grant_types.is_empty() {
        config.grant_types = metadata.grant_types.clone();
    }
    config.scopes = metadata
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_else(|| vec!["openid".to_string()]);
    config.allow_offline_access = config.scopes.iter().any(|s| s == "offline_access");
    config.token_endpoint_auth_method = auth_method.to_string();
    config.jwks = metadata.jwks.clone();
    config.jwks_uri = metadata.jwks_uri.clone();
    if let Some(subject_type) = &metadata.subject_type {
        config.subject_type = subject_type.clone();
    }
    config.sector_identifier_uri = metadata.sector_identifier_uri.clone();
    if let Some(alg) = &metadata.id_token_signed_response_alg {
        config.id_token_signed_response_alg = alg.clone();
    }
    config.userinfo_signed_response_alg = metadata.userinfo_signed_response_alg.clone();
    config.frontchannel_logout_uri = metadata.frontchannel_logout_uri.clone();
    config.backchannel_logout_uri = metadata.backchannel_logout_uri.clone();

    config.validate().map_err(|e| {
        let description = e.to_string();
        let code = if description.contains("redirect") {
            ErrorCode::InvalidRedirectUri
        } else {
            ErrorCode::InvalidClientMetadata
        };
        OidcError::validate(code, description)
    })?;

    Ok(ClientInfo::from(&config))
}

fn metadata_from_client(client: &ClientInfo) -> ClientMetadata {
    ClientMetadata {
        redirect_uris: client.redirect_uris.clone(),
        client_name: None,
        response_types: client.response_types.clone(),
        grant_types: client.grant_types.clone(),
        scope: Some(client.scopes.join(" ")),
        token_endpoint_auth_method: Some(client.token_endpoint_auth_method.clone()),
        jwks: None,
        jwks_uri: client.jwks_uri.clone(),
        subject_type: Some(client.subject_type.clone()),
        sector_identifier_uri: client.sector_identifier_uri.clone(),
        id_token_signed_response_alg: Some(client.id_token_signed_response_alg.clone()),
        id_token_encrypted_response_alg: None,
        userinfo_signed_response_alg: client.userinfo_signed_response_alg.clone(),
        frontchannel_logout_uri: client.frontchannel_logout_uri.clone(),
        backchannel_logout_uri: client.backchannel_logout_uri.clone(),
        post_logout_redirect_uris: client.post_logout_redirect_uris.clone(),
    }
}

fn hash_token(token: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(sha256(token.as_bytes()))
}

fn management_uri(state: &OidcState, client_id: &str) -> String {
    let base = state
        .endpoint_url("register")
        .unwrap_or_else(|| format!("{}/connect/register", state.issuer()));
    format!("{base}/{client_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn state() -> OidcState {
        let config = Config::from_yaml("{}").unwrap();
        OidcState::from_config(Arc::new(config)).unwrap()
    }

    fn metadata() -> ClientMetadata {
        ClientMetadata {
            redirect_uris: vec!["https://rp.example.com/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            scope: Some("openid profile".to_string()),
            token_endpoint_auth_method: Some("client_secret_basic".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn registration_roundtrip_and_management() {
        let state = state();
        let registered = handle_registration(&state, metadata()).await.unwrap();
        assert!(registered.client_secret.is_some());

        let read = handle_registration_read(
            &state,
            &registered.client_id,
            &registered.registration_access_token,
        )
        .await
        .unwrap();
        assert_eq!(read.redirect_uris, metadata().redirect_uris);

        // PUT rotates the management token.
        let updated = handle_registration_update(
            &state,
            &registered.client_id,
            &registered.registration_access_token,
            metadata(),
        )
        .await
        .unwrap();
        assert_ne!(
            updated.registration_access_token,
            registered.registration_access_token
        );

        // The old token no longer works.
        let err = handle_registration_read(
            &state,
            &registered.client_id,
            &registered.registration_access_token,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);

        handle_registration_delete(
            &state,
            &registered.client_id,
            &updated.registration_access_token,
        )
        .await
        .unwrap();
        assert!(state.clients.get(&registered.client_id).is_none());
    }

    #[tokio::test]
    async fn encrypted_id_tokens_are_rejected() {
        let state = state();
        let mut bad = metadata();
        bad.id_token_encrypted_response_alg = Some("RSA-OAEP".to_string());
        let err = handle_registration(&state, bad).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);
    }

    #[tokio::test]
    async fn interactive_client_without_redirect_uri_is_rejected() {
        let state = state();
        let mut bad = metadata();
        bad.redirect_uris.clear();
        let err = handle_registration(&state, bad).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRedirectUri);
    }
}
