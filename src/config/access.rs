// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Client, scope and resource configuration
//!
//! This module defines the statically registered relying parties, the scope
//! and resource registries, and the trusted issuers accepted by the
//! JWT-bearer grant.
//!
//! Clients registered here are merged into the same client store that
//! dynamic registration (RFC 7591) writes to; the engine does not
//! distinguish the two origins.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// OAuth2/OIDC client registration.
///
/// # Example
///
/// ```rust
/// use rust_oidc_server::config::ClientConfig;
///
/// let yaml = r#"
/// client_id: "dashboard"
/// redirect_uris: ["https://app.example.com/cb"]
/// grant_types: ["authorization_code", "refresh_token"]
/// response_types: ["code"]
/// scopes: ["openid", "profile", "offline_access"]
/// token_endpoint_auth_method: "none"
/// "#;
/// let client: ClientConfig = serde_yml::from_str(yaml).unwrap();
/// assert_eq!(client.client_id, "dashboard");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The unique identifier for the client.
    pub client_id: String,

    /// Client secret as a crypt(3)-style hash (`$5$...` / `$6$...`),
    /// created with `openssl passwd -5 <secret>`.
    ///
    /// Required for the `client_secret_basic`, `client_secret_post` and
    /// `client_secret_jwt` authentication methods.
    #[serde(default)]
    pub client_secret_hash: Option<String>,

    /// Plain client secret, only consulted by `client_secret_jwt` HMAC
    /// verification (an HMAC cannot be computed from a hash). Confidential
    /// clients using that method must configure it.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Client JWKS by value, for `private_key_jwt` and request object
    /// signature verification.
    #[serde(default)]
    pub jwks: Option<serde_json::Value>,

    /// Client JWKS by reference. Fetched through the SSRF-guarded HTTP
    /// client and cached.
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Expected TLS client certificate subject DN (`tls_client_auth`).
    #[serde(default)]
    pub tls_client_auth_subject_dn: Option<String>,

    /// Expected TLS client certificate SAN dNSName (`tls_client_auth`).
    #[serde(default)]
    pub tls_client_auth_san_dns: Option<String>,

    /// Expected TLS client certificate SAN URI (`tls_client_auth`).
    #[serde(default)]
    pub tls_client_auth_san_uri: Option<String>,

    /// List of URLs that this client is allowed to redirect to after
    /// authorization.
    ///
    /// These URLs must match exactly during the flow; they must be absolute
    /// and carry no fragment.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Allowed post-logout redirect URIs (RP-initiated logout).
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Allowed response types (`code`, `id_token`, `code id_token`, ...).
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,

    /// Allowed grant types.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,

    /// Scopes this client may request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Token endpoint authentication method.
    ///
    /// One of `client_secret_basic`, `client_secret_post`,
    /// `client_secret_jwt`, `private_key_jwt`, `tls_client_auth`,
    /// `self_signed_tls_client_auth`, `none`.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: String,

    /// Whether PKCE is mandatory for the authorization code flow.
    #[serde(default = "default_true")]
    pub require_pkce: bool,

    /// Whether the `plain` code challenge method is accepted.
    #[serde(default)]
    pub allow_plain_pkce: bool,

    /// Access token lifetime in seconds.
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,

    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,

    /// Whether refresh tokens rotate on use.
    #[serde(default = "default_true")]
    pub refresh_token_rotation: bool,

    /// Whether the client may request `offline_access`.
    #[serde(default)]
    pub allow_offline_access: bool,

    /// JWS algorithm for issued ID tokens.
    #[serde(default = "default_id_token_alg")]
    pub id_token_signed_response_alg: String,

    /// When set, UserInfo responses are returned as a JWT signed with this
    /// algorithm instead of plain JSON.
    #[serde(default)]
    pub userinfo_signed_response_alg: Option<String>,

    /// Subject type: `public` or `pairwise`.
    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    /// Sector identifier URI, required when `subject_type` is `pairwise`
    /// and the redirect URIs span more than one host.
    #[serde(default)]
    pub sector_identifier_uri: Option<String>,

    /// Front-channel logout URI, rendered as a hidden iframe at
    /// end-session time.
    #[serde(default)]
    pub frontchannel_logout_uri: Option<String>,

    /// Back-channel logout URI, POSTed a signed logout token.
    #[serde(default)]
    pub backchannel_logout_uri: Option<String>,

    /// Whether issued access tokens are bound to the client's TLS
    /// certificate (`cnf.x5t#S256`). Requires one of the mTLS
    /// authentication methods.
    #[serde(default)]
    pub certificate_bound_access_tokens: bool,
}

impl ClientConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            bail!("client_id must not be empty");
        }
        let interactive = self
            .grant_types
            .iter()
            .any(|g| g == "authorization_code" || g == "implicit");
        if interactive && self.redirect_uris.is_empty() {
            bail!(
                "Client {:?} uses an interactive grant but registers no redirect_uris",
                self.client_id
            );
        }
        for uri in &self.redirect_uris {
            let parsed = url::Url::parse(uri).map_err(|e| {
                anyhow::anyhow!("Client {:?} redirect URI {:?}: {}", self.client_id, uri, e)
            })?;
            if parsed.fragment().is_some() {
                bail!(
                    "Client {:?} redirect URI {:?} must not carry a fragment",
                    self.client_id,
                    uri
                );
            }
        }
        if self.subject_type == "pairwise"
            && self.sector_identifier_uri.is_none()
            && !self.redirect_uris.is_empty()
        {
            let hosts: std::collections::HashSet<_> = self
                .redirect_uris
                .iter()
                .filter_map(|u| url::Url::parse(u).ok())
                .filter_map(|u| u.host_str().map(str::to_string))
                .collect();
            if hosts.len() > 1 {
                bail!(
                    "Client {:?} is pairwise with multi-host redirect URIs and needs a sector_identifier_uri",
                    self.client_id
                );
            }
        }
        if self.certificate_bound_access_tokens
            && !matches!(
                self.token_endpoint_auth_method.as_str(),
                "tls_client_auth" | "self_signed_tls_client_auth"
            )
        {
            bail!(
                "Client {:?} requests certificate-bound tokens without an mTLS auth method",
                self.client_id
            );
        }
        Ok(())
    }
}

/// A scope known to the scope registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Scope name as it appears in `scope` parameters.
    pub name: String,

    /// Claims released to UserInfo when this scope is granted.
    #[serde(default)]
    pub claims: Vec<String>,

    /// Whether the scope only makes sense against a requested resource.
    #[serde(default)]
    pub resource_bound: bool,
}

/// A resource (API audience) known to the resource registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Absolute, fragment-free resource URI used as the `aud` value.
    pub uri: String,

    /// Scopes this resource offers.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A trusted issuer for the `jwt-bearer` assertion grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedIssuerConfig {
    /// Expected `iss` value of assertions from this issuer.
    pub issuer: String,

    /// JWKS endpoint the assertion signature is verified against.
    pub jwks_uri: String,

    /// Subjects from this issuer are mapped onto this client for scope and
    /// resource checks.
    pub client_id: String,
}

/// Registered clients plus the scope/resource registries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Statically registered clients.
    #[serde(default)]
    pub clients: Vec<ClientConfig>,

    /// Scope registry. `openid`, `profile`, `email` and `offline_access`
    /// are implied when absent.
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,

    /// Resource registry.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,

    /// Trusted JWT-bearer assertion issuers.
    #[serde(default)]
    pub trusted_issuers: Vec<TrustedIssuerConfig>,

    /// Whether dynamic client registration is open (no initial token).
    #[serde(default)]
    pub open_registration: bool,
}

impl AccessConfig {
    pub(super) fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for client in &self.clients {
            client.validate()?;
            if !seen.insert(client.client_id.as_str()) {
                bail!("Duplicate client_id {:?}", client.client_id);
            }
        }
        for resource in &self.resources {
            let parsed = url::Url::parse(&resource.uri)
                .map_err(|e| anyhow::anyhow!("Resource URI {:?}: {}", resource.uri, e))?;
            if parsed.fragment().is_some() {
                bail!("Resource URI {:?} must not carry a fragment", resource.uri);
            }
        }
        Ok(())
    }
}

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

fn default_grant_types() -> Vec<String> {
    vec!["authorization_code".to_string()]
}

fn default_auth_method() -> String {
    "client_secret_basic".to_string()
}

fn default_true() -> bool {
    true
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30
}

fn default_id_token_alg() -> String {
    "RS256".to_string()
}

fn default_subject_type() -> String {
    "public".to_string()
}
