// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Discovery document
//!
//! Aggregates the server's metadata into the OIDC discovery document
//! served at `/.well-known/openid-configuration`.
//!
//! ## mTLS aliases (RFC 8705 §5)
//!
//! Explicit `mtls_endpoint_aliases` from configuration win. Otherwise,
//! when `mtls_base_uri` is configured, an alias is derived per
//! client-authenticating endpoint by appending the endpoint's path
//! relative to the route base onto the mTLS base (trailing slashes are
//! normalized). Disabled endpoints get no alias.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::OidcState;

/// Endpoints that authenticate clients and therefore participate in mTLS
/// aliasing.
const MTLS_ALIASED: &[(&str, &str)] = &[
    ("token", "token_endpoint"),
    ("introspection", "introspection_endpoint"),
    ("revocation", "revocation_endpoint"),
    ("par", "pushed_authorization_request_endpoint"),
    ("device_authorization", "device_authorization_endpoint"),
    ("bc_authorize", "backchannel_authentication_endpoint"),
    ("userinfo", "userinfo_endpoint"),
];

/// The discovery document (OIDC Discovery §3, with RFC 8414 members).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    pub jwks_uri: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_session_iframe: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backchannel_authentication_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<String>,

    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,

    pub request_parameter_supported: bool,
    pub request_uri_parameter_supported: bool,
    pub tls_client_certificate_bound_access_tokens: bool,
    pub backchannel_logout_supported: bool,
    pub backchannel_logout_session_supported: bool,
    pub frontchannel_logout_supported: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backchannel_token_delivery_modes_supported: Vec<String>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub mtls_endpoint_aliases: HashMap<String, String>,
}

/// Compose the discovery document from the engine state.
pub fn discovery_document(state: &OidcState) -> DiscoveryDocument {
    let signing_algs: Vec<String> = {
        let mut algs: Vec<String> = state
            .keys
            .public_jwks()
            .keys
            .iter()
            .filter_map(|k| k.alg().map(str::to_string))
            .collect();
        algs.dedup();
        if algs.is_empty() {
            algs.push("RS256".to_string());
        }
        algs
    };

    let mut claims_supported = vec!["sub".to_string(), "iss".to_string(), "aud".to_string()];
    for scope in ["profile", "email", "address", "phone"] {
        if let Some(definition) = state.scopes.get(scope) {
            for claim in &definition.claims {
                if !claims_supported.contains(claim) {
                    claims_supported.push(claim.clone());
                }
            }
        }
    }

    DiscoveryDocument {
        issuer: state.issuer().to_string(),
        authorization_endpoint: state.endpoint_url("authorize"),
        token_endpoint: state.endpoint_url("token"),
        userinfo_endpoint: state.endpoint_url("userinfo"),
        jwks_uri: state
            .endpoint_url("jwks")
            .unwrap_or_else(|| format!("{}/.well-known/jwks", state.issuer())),
        registration_endpoint: state.endpoint_url("register"),
        introspection_endpoint: state.endpoint_url("introspection"),
        revocation_endpoint: state.endpoint_url("revocation"),
        end_session_endpoint: state.endpoint_url("endsession"),
        check_session_iframe: state.endpoint_url("checksession"),
        device_authorization_endpoint: state.endpoint_url("device_authorization"),
        backchannel_authentication_endpoint: state.endpoint_url("bc_authorize"),
        pushed_authorization_request_endpoint: state.endpoint_url("par"),
        scopes_supported: vec![
            "openid".to_string(),
            "profile".to_string(),
            "email".to_string(),
            "address".to_string(),
            "phone".to_string(),
            "offline_access".to_string(),
        ],
        response_types_supported: vec![
            "code".to_string(),
            "id_token".to_string(),
            "code id_token".to_string(),
            "code token".to_string(),
            "id_token token".to_string(),
            "code id_token token".to_string(),
        ],
        response_modes_supported: vec![
            "query".to_string(),
            "fragment".to_string(),
            "form_post".to_string(),
            "jwt".to_string(),
            "query.jwt".to_string(),
            "fragment.jwt".to_string(),
            "form_post.jwt".to_string(),
        ],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
            "client_credentials".to_string(),
            super::token::GRANT_DEVICE_CODE.to_string(),
            super::token::GRANT_CIBA.to_string(),
            super::token::GRANT_JWT_BEARER.to_string(),
        ],
        subject_types_supported: vec!["public".to_string(), "pairwise".to_string()],
        id_token_signing_alg_values_supported: signing_algs,
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "client_secret_jwt".to_string(),
            "private_key_jwt".to_string(),
            "tls_client_auth".to_string(),
            "self_signed_tls_client_auth".to_string(),
            "none".to_string(),
        ],
        claims_supported,
        code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
        request_parameter_supported: true,
        request_uri_parameter_supported: true,
        tls_client_certificate_bound_access_tokens: true,
        backchannel_logout_supported: true,
        backchannel_logout_session_supported: true,
        frontchannel_logout_supported: true,
        backchannel_token_delivery_modes_supported: if state.is_endpoint_disabled("bc_authorize")
        {
            Vec::new()
        } else {
            vec!["poll".to_string()]
        },
        mtls_endpoint_aliases: mtls_aliases(state),
    }
}

/// Compute the mTLS alias map.
fn mtls_aliases(state: &OidcState) -> HashMap<String, String> {
    let server = &state.config.server;
    let mut aliases = HashMap::new();

    for (route_key, metadata_name) in MTLS_ALIASED {
        // A disabled endpoint gets no alias regardless of configuration.
        if state.endpoint_url(route_key).is_none() {
            continue;
        }
        if let Some(explicit) = server.mtls_endpoint_aliases.get(*metadata_name) {
            aliases.insert(metadata_name.to_string(), explicit.clone());
            continue;
        }
        if let Some(base) = &server.mtls_base_uri {
            if let Some(alias) = derive_alias(state, base, route_key) {
                aliases.insert(metadata_name.to_string(), alias);
            }
        }
    }
    aliases
}

/// Derive one alias: mTLS base + the endpoint's path relative to the
/// route base, with exactly one slash at the seam.
fn derive_alias(state: &OidcState, mtls_base: &str, route_key: &str) -> Option<String> {
    let endpoint_path = state.routes.path(route_key).ok()?;
    let base_path = state.routes.path("base").ok()?;

    let relative = endpoint_path
        .strip_prefix(&base_path)
        .unwrap_or(&endpoint_path)
        .trim_start_matches('/');

    Some(format!("{}/{relative}", mtls_base.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn state_with(yaml: &str) -> OidcState {
        let config = Config::from_yaml(yaml).unwrap();
        OidcState::from_config(Arc::new(config)).unwrap()
    }

    #[test]
    fn aliases_derive_from_the_mtls_base() {
        let state = state_with(
            r#"
server:
  issuer: "https://example.com"
  mtls_base_uri: "https://mtls.example.com/oauth/"
"#,
        );
        let document = discovery_document(&state);
        assert_eq!(
            document.token_endpoint.as_deref(),
            Some("https://example.com/connect/token")
        );
        assert_eq!(
            document.mtls_endpoint_aliases.get("token_endpoint").map(String::as_str),
            Some("https://mtls.example.com/oauth/token")
        );
    }

    #[test]
    fn disabled_endpoint_loses_its_alias() {
        let state = state_with(
            r#"
server:
  issuer: "https://example.com"
  mtls_base_uri: "https://mtls.example.com/oauth/"
  disabled_endpoints: ["token"]
"#,
        );
        let document = discovery_document(&state);
        assert!(document.token_endpoint.is_none());
        assert!(!document.mtls_endpoint_aliases.contains_key("token_endpoint"));
    }

    #[test]
    fn explicit_aliases_win_over_derivation() {
        let state = state_with(
            r#"
server:
  issuer: "https://example.com"
  mtls_base_uri: "https://mtls.example.com/oauth/"
  mtls_endpoint_aliases:
    token_endpoint: "https://mtls-custom.example.com/token"
"#,
        );
        let document = discovery_document(&state);
        assert_eq!(
            document.mtls_endpoint_aliases.get("token_endpoint").map(String::as_str),
            Some("https://mtls-custom.example.com/token")
        );
    }
}
