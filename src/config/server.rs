// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Server configuration
//!
//! Network binding, issuer identity, mTLS endpoint aliasing and route
//! template overrides for the authorization server.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the HTTP front of the authorization server.
///
/// The `issuer` is the value every signed token carries in its `iss` claim
/// and the base URL all advertised endpoints are rooted under. It must be an
/// absolute `https` URL without query or fragment (plain `http` is accepted
/// for loopback development setups only).
///
/// ### mTLS aliases
///
/// Deployments that terminate mutual TLS on a dedicated hostname can either
/// list explicit aliases in `mtls_endpoint_aliases` or set `mtls_base_uri`
/// and let the discovery document derive one alias per endpoint by combining
/// the base with the endpoint's path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The TCP port the server will listen on.
    ///
    /// Valid range is 1-65534. Default value is 8080.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the server will bind to.
    ///
    /// Default is "127.0.0.1". Use "0.0.0.0" to bind to all IPv4 interfaces.
    #[serde(default = "default_address")]
    pub address: String,

    /// The server name reported in HTTP headers and logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// SSL/TLS certificate in PEM format, Base64 encoded.
    ///
    /// If provided, `key` must also be supplied. When absent the server
    /// operates behind a TLS-terminating proxy.
    #[serde(default)]
    pub cert: Option<String>,

    /// SSL/TLS private key in PEM format, Base64 encoded.
    #[serde(default)]
    pub key: Option<String>,

    /// Issuer identifier, e.g. `https://auth.example.com`.
    ///
    /// Used as the `iss` claim of every signed token and as the base URL of
    /// all advertised endpoints.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Base URL of the mutual-TLS endpoint host, e.g.
    /// `https://mtls.example.com/oauth/`.
    ///
    /// When set and no explicit alias exists for an endpoint, the discovery
    /// document derives `mtls_endpoint_aliases` by appending each endpoint's
    /// path to this base.
    #[serde(default)]
    pub mtls_base_uri: Option<String>,

    /// Explicit mTLS endpoint aliases, keyed by discovery metadata name
    /// (`token_endpoint`, `introspection_endpoint`, ...).
    ///
    /// Explicit entries win over derivation from `mtls_base_uri`.
    #[serde(default)]
    pub mtls_endpoint_aliases: HashMap<String, String>,

    /// Endpoints disabled in this deployment (`device_authorization`,
    /// `ciba`, `registration`, ...). A disabled endpoint is not mounted and
    /// its discovery metadata (including any mTLS alias) is omitted.
    #[serde(default)]
    pub disabled_endpoints: Vec<String>,

    /// Route template overrides, resolved through the `[route:key?fallback]`
    /// mechanism. Example: `{ "base": "~/custom-connect",
    /// "authorize": "[route:base]/authorize" }`.
    #[serde(default)]
    pub routes: HashMap<String, String>,

    /// Name of the OP browser-state session cookie.
    #[serde(default = "default_session_cookie")]
    pub session_cookie_name: String,
}

impl ServerConfig {
    pub(super) fn validate(&self) -> Result<()> {
        let issuer = url::Url::parse(&self.issuer)
            .map_err(|e| anyhow::anyhow!("Invalid issuer URL {:?}: {}", self.issuer, e))?;
        if issuer.fragment().is_some() || issuer.query().is_some() {
            bail!("Issuer URL must not carry a query or fragment");
        }
        if self.cert.is_some() != self.key.is_some() {
            bail!("TLS cert and key must be provided together");
        }
        if let Some(base) = &self.mtls_base_uri {
            url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("Invalid mtls_base_uri {:?}: {}", base, e))?;
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            name: default_name(),
            cert: None,
            key: None,
            issuer: default_issuer(),
            mtls_base_uri: None,
            mtls_endpoint_aliases: HashMap::new(),
            disabled_endpoints: Vec::new(),
            routes: HashMap::new(),
            session_cookie_name: default_session_cookie(),
        }
    }
}

/// Back-channel logout delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutConfig {
    /// Per-target delivery timeout in seconds.
    #[serde(default = "default_backchannel_timeout")]
    pub backchannel_timeout: u64,

    /// Maximum number of simultaneous back-channel deliveries.
    #[serde(default = "default_backchannel_concurrency")]
    pub backchannel_concurrency: usize,

    /// Lifetime of issued logout tokens in seconds.
    #[serde(default = "default_logout_token_lifetime")]
    pub logout_token_lifetime: i64,
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            backchannel_timeout: default_backchannel_timeout(),
            backchannel_concurrency: default_backchannel_concurrency(),
            logout_token_lifetime: default_logout_token_lifetime(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_name() -> String {
    format!("OidcServer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_issuer() -> String {
    "https://localhost:8080".to_string()
}

fn default_session_cookie() -> String {
    "op_session".to_string()
}

fn default_backchannel_timeout() -> u64 {
    5
}

fn default_backchannel_concurrency() -> usize {
    4
}

fn default_logout_token_lifetime() -> i64 {
    120
}
