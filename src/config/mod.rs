// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Configuration handling
//!
//! This module defines the YAML configuration of the authorization server.
//! The configuration is loaded once at startup and is read-only afterwards;
//! every section carries serde defaults so a minimal file is enough to boot
//! a development instance.
//!
//! ## Sections
//!
//! - [`ServerConfig`] - network binding, issuer URL, mTLS aliases, routes
//! - [`SecurityConfig`] - signing keys and key rotation
//! - [`AccessConfig`] - registered clients, scopes, resources, trusted issuers
//! - [`LifetimesConfig`] - TTLs for codes, tokens and polling intervals
//!
//! ## Example
//!
//! ```rust
//! use rust_oidc_server::config::Config;
//!
//! let yaml = r#"
//! server:
//!   issuer: "https://auth.example.com"
//! "#;
//! let config = Config::from_yaml(yaml).unwrap();
//! assert_eq!(config.server.issuer, "https://auth.example.com");
//! ```

mod access;
mod lifetimes;
mod security;
mod server;

pub use access::{
    AccessConfig, ClientConfig, ResourceConfig, ScopeConfig, TrustedIssuerConfig,
};
pub use lifetimes::LifetimesConfig;
pub use security::{SecurityConfig, SigningKeyEntry};
pub use server::{LogoutConfig, ServerConfig};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration of the authorization server.
///
/// Deserialized from a single YAML document. All sections are optional in the
/// file; missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network and issuer settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Signing key material.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Registered clients, scopes, resources and trusted assertion issuers.
    #[serde(default)]
    pub access: AccessConfig,

    /// TTLs and polling intervals.
    #[serde(default)]
    pub lifetimes: LifetimesConfig,

    /// Back-channel logout delivery settings.
    #[serde(default)]
    pub logout: LogoutConfig,
}

impl Config {
    /// Load the configuration from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse as a
    /// valid configuration document.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Parse the configuration from a YAML string.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config =
            serde_yml::from_str(raw).context("Failed to parse configuration YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation that serde cannot express.
    fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.access.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.lifetimes.authorization_code_ttl, 60);
    }

    #[test]
    fn rejects_client_without_redirect_uri() {
        let yaml = r#"
access:
  clients:
    - client_id: "broken"
      redirect_uris: []
      grant_types: ["authorization_code"]
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
