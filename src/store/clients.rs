// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Client registry
//!
//! [`ClientInfo`] is the engine's view of a registered relying party,
//! whether it was configured statically or registered dynamically
//! (RFC 7591). The [`ClientStore`] owns the records; endpoint pipelines
//! only read them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::ClientConfig;
use crate::jwt::JwkKeySet;

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Globally unique client identifier.
    pub client_id: String,

    /// crypt(3)-style hash of the client secret.
    pub client_secret_hash: Option<String>,

    /// Plain secret, kept only for clients using `client_secret_jwt`.
    pub client_secret: Option<String>,

    /// Client keys by value.
    pub jwks: Option<JwkKeySet>,

    /// Client keys by reference.
    pub jwks_uri: Option<String>,

    /// Registered TLS subject DN for `tls_client_auth`.
    pub tls_client_auth_subject_dn: Option<String>,

    /// Registered SAN dNSName for `tls_client_auth`.
    pub tls_client_auth_san_dns: Option<String>,

    /// Registered SAN URI for `tls_client_auth`.
    pub tls_client_auth_san_uri: Option<String>,

    /// Exact-match redirect URI allowlist.
    pub redirect_uris: Vec<String>,

    /// Post-logout redirect URI allowlist.
    pub post_logout_redirect_uris: Vec<String>,

    /// Allowed response types.
    pub response_types: Vec<String>,

    /// Allowed grant types.
    pub grant_types: Vec<String>,

    /// Allowed scopes.
    pub scopes: Vec<String>,

    /// Token endpoint authentication method.
    pub token_endpoint_auth_method: String,

    /// Whether PKCE is mandatory for the code flow.
    pub require_pkce: bool,

    /// Whether the `plain` challenge method is accepted.
    pub allow_plain_pkce: bool,

    /// Access token lifetime in seconds.
    pub access_token_lifetime: i64,

    /// Refresh token lifetime in seconds.
    pub refresh_token_lifetime: i64,

    /// Whether refresh tokens rotate on use.
    pub refresh_token_rotation: bool,

    /// Whether `offline_access` may be requested.
    pub allow_offline_access: bool,

    /// ID token signing algorithm.
    pub id_token_signed_response_alg: String,

    /// When set, UserInfo responses are signed JWTs with this algorithm.
    pub userinfo_signed_response_alg: Option<String>,

    /// `public` or `pairwise`.
    pub subject_type: String,

    /// Sector identifier for pairwise subject derivation.
    pub sector_identifier_uri: Option<String>,

    /// Front-channel logout URI.
    pub frontchannel_logout_uri: Option<String>,

    /// Back-channel logout URI.
    pub backchannel_logout_uri: Option<String>,

    /// Whether access tokens are certificate-bound (RFC 8705).
    pub certificate_bound_access_tokens: bool,

    /// Hash of the RFC 7592 registration access token. Only set for
    /// dynamically registered clients.
    pub registration_access_token_hash: Option<String>,
}

impl ClientInfo {
    /// Whether `uri` is in the redirect allowlist (exact match).
    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn allows_post_logout_redirect_uri(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|u| u == uri)
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Response types are compared as sets of space-separated tokens, so a
    /// registration of `code id_token` also matches `id_token code`.
    pub fn allows_response_type(&self, response_type: &str) -> bool {
        let requested: std::collections::BTreeSet<&str> =
            response_type.split_whitespace().collect();
        self.response_types.iter().any(|registered| {
            registered.split_whitespace().collect::<std::collections::BTreeSet<&str>>()
                == requested
        })
    }

    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// The host used to derive pairwise subjects: the sector identifier
    /// host when registered, otherwise the host of the sole redirect URI.
    pub fn pairwise_sector(&self) -> Option<String> {
        if let Some(uri) = &self.sector_identifier_uri {
            return url::Url::parse(uri)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string));
        }
        self.redirect_uris
            .first()
            .and_then(|u| url::Url::parse(u).ok())
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl From<&ClientConfig> for ClientInfo {
    fn from(config: &ClientConfig) -> Self {
        let jwks = config
            .jwks
            .clone()
            .and_then(|v| serde_json::from_value::<JwkKeySet>(v).ok());
        Self {
            client_id: config.client_id.clone(),
            client_secret_hash: config.client_secret_hash.clone(),
            client_secret: config.client_secret.clone(),
            jwks,
            jwks_uri: config.jwks_uri.clone(),
            tls_client_auth_subject_dn: config.tls_client_auth_subject_dn.clone(),
            tls_client_auth_san_dns: config.tls_client_auth_san_dns.clone(),
            tls_client_auth_san_uri: config.tls_client_auth_san_uri.clone(),
            redirect_uris: config.redirect_uris.clone(),
            post_logout_redirect_uris: config.post_logout_redirect_uris.clone(),
            response_types: config.response_types.clone(),
            grant_types: config.grant_types.clone(),
            scopes: config.scopes.clone(),
            token_endpoint_auth_method: config.token_endpoint_auth_method.clone(),
            require_pkce: config.require_pkce,
            allow_plain_pkce: config.allow_plain_pkce,
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
            refresh_token_rotation: config.refresh_token_rotation,
            allow_offline_access: config.allow_offline_access,
            id_token_signed_response_alg: config.id_token_signed_response_alg.clone(),
            userinfo_signed_response_alg: config.userinfo_signed_response_alg.clone(),
            subject_type: config.subject_type.clone(),
            sector_identifier_uri: config.sector_identifier_uri.clone(),
            frontchannel_logout_uri: config.frontchannel_logout_uri.clone(),
            backchannel_logout_uri: config.backchannel_logout_uri.clone(),
            certificate_bound_access_tokens: config.certificate_bound_access_tokens,
            registration_access_token_hash: None,
        }
    }
}

/// In-process client registry.
///
/// Clients do not expire; the registry is a plain map under a read-write
/// lock rather than a TTL store.
pub struct ClientStore {
    clients: RwLock<HashMap<String, ClientInfo>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the registry from configuration.
    pub fn from_config(clients: &[ClientConfig]) -> Self {
        let store = Self::new();
        {
            let mut map = store.clients.write().unwrap();
            for config in clients {
                map.insert(config.client_id.clone(), ClientInfo::from(config));
            }
        }
        store
    }

    pub fn get(&self, client_id: &str) -> Option<ClientInfo> {
        self.clients.read().unwrap().get(client_id).cloned()
    }

    /// Insert a new client. Returns `false` when the id is taken.
    pub fn insert(&self, client: ClientInfo) -> bool {
        let mut map = self.clients.write().unwrap();
        if map.contains_key(&client.client_id) {
            return false;
        }
        map.insert(client.client_id.clone(), client);
        true
    }

    /// Replace an existing client. Returns `false` when absent.
    pub fn update(&self, client: ClientInfo) -> bool {
        let mut map = self.clients.write().unwrap();
        match map.get_mut(&client.client_id) {
            Some(slot) => {
                *slot = client;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, client_id: &str) -> bool {
        self.clients.write().unwrap().remove(client_id).is_some()
    }
}

impl Default for ClientStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_type_matching_is_order_insensitive() {
        let mut config = ClientConfig {
            client_id: "c".to_string(),
            ..serde_yml::from_str("client_id: c").unwrap()
        };
        config.response_types = vec!["code id_token".to_string()];
        let client = ClientInfo::from(&config);

        assert!(client.allows_response_type("id_token code"));
        assert!(!client.allows_response_type("code"));
    }

    #[test]
    fn duplicate_insert_is_refused() {
        let config: ClientConfig = serde_yml::from_str("client_id: dup").unwrap();
        let store = ClientStore::new();
        assert!(store.insert(ClientInfo::from(&config)));
        assert!(!store.insert(ClientInfo::from(&config)));
    }
}
