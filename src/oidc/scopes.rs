// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Scope and resource registries
//!
//! Scopes map onto UserInfo claims; resources (RFC 8707) are the
//! audiences tokens can be minted for. A requested scope must be known to
//! the scope registry or offered by one of the requested resources.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{ErrorCode, OidcError};
use crate::config::{ResourceConfig, ScopeConfig};

/// A scope and the claims it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeDefinition {
    pub name: String,
    pub claims: Vec<String>,
    pub resource_bound: bool,
}

/// A resource (audience) and the scopes it offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub uri: String,
    pub scopes: Vec<String>,
}

/// Registry of known scopes.
pub struct ScopeManager {
    scopes: HashMap<String, ScopeDefinition>,
}

impl ScopeManager {
    /// Build the registry from configuration, with the OIDC standard
    /// scopes pre-registered.
    pub fn from_config(configured: &[ScopeConfig]) -> Self {
        let mut scopes = HashMap::new();
        for (name, claims) in [
            ("openid", vec!["sub"]),
            (
                "profile",
                vec![
                    "name",
                    "family_name",
                    "given_name",
                    "middle_name",
                    "nickname",
                    "preferred_username",
                    "profile",
                    "picture",
                    "website",
                    "gender",
                    "birthdate",
                    "zoneinfo",
                    "locale",
                    "updated_at",
                ],
            ),
            ("email", vec!["email", "email_verified"]),
            ("address", vec!["address"]),
            ("phone", vec!["phone_number", "phone_number_verified"]),
            ("offline_access", vec![]),
        ] {
            scopes.insert(
                name.to_string(),
                ScopeDefinition {
                    name: name.to_string(),
                    claims: claims.into_iter().map(str::to_string).collect(),
                    resource_bound: false,
                },
            );
        }
        for config in configured {
            scopes.insert(
                config.name.clone(),
                ScopeDefinition {
                    name: config.name.clone(),
                    claims: config.claims.clone(),
                    resource_bound: config.resource_bound,
                },
            );
        }
        Self { scopes }
    }

    pub fn get(&self, name: &str) -> Option<&ScopeDefinition> {
        self.scopes.get(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Union of the claims implied by `scopes`, in registry order.
    pub fn claims_for(&self, scopes: &[String]) -> Vec<String> {
        let mut claims = Vec::new();
        for scope in scopes {
            if let Some(definition) = self.scopes.get(scope) {
                for claim in &definition.claims {
                    if !claims.contains(claim) {
                        claims.push(claim.clone());
                    }
                }
            }
        }
        claims
    }
}

/// Registry of known resources.
pub struct ResourceManager {
    resources: HashMap<String, ResourceDefinition>,
}

impl ResourceManager {
    pub fn from_config(configured: &[ResourceConfig]) -> Self {
        let mut resources = HashMap::new();
        for config in configured {
            resources.insert(
                config.uri.clone(),
                ResourceDefinition {
                    uri: config.uri.clone(),
                    scopes: config.scopes.clone(),
                },
            );
        }
        Self { resources }
    }

    pub fn get(&self, uri: &str) -> Option<&ResourceDefinition> {
        self.resources.get(uri)
    }

    /// Resolve the requested `resource` parameters.
    ///
    /// Each must be an absolute, fragment-free URI registered here
    /// (RFC 8707 §2).
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<ResourceDefinition>, OidcError> {
        let mut resolved = Vec::new();
        for uri in requested {
            let parsed = url::Url::parse(uri).map_err(|_| {
                OidcError::validate(
                    ErrorCode::InvalidTarget,
                    format!("Resource {uri:?} is not an absolute URI"),
                )
            })?;
            if parsed.fragment().is_some() {
                return Err(OidcError::validate(
                    ErrorCode::InvalidTarget,
                    format!("Resource {uri:?} must not carry a fragment"),
                ));
            }
            let definition = self.resources.get(uri).ok_or_else(|| {
                OidcError::validate(
                    ErrorCode::InvalidTarget,
                    format!("Resource {uri:?} is not registered"),
                )
            })?;
            resolved.push(definition.clone());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scopes_are_preregistered() {
        let manager = ScopeManager::from_config(&[]);
        assert!(manager.is_known("openid"));
        assert!(manager.is_known("offline_access"));
        assert!(manager
            .claims_for(&["email".to_string()])
            .contains(&"email_verified".to_string()));
    }

    #[test]
    fn unregistered_resource_is_invalid_target() {
        let manager = ResourceManager::from_config(&[]);
        let err = manager
            .resolve(&["https://api.example.com".to_string()])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTarget);
    }

    #[test]
    fn fragment_resources_are_rejected() {
        let manager = ResourceManager::from_config(&[ResourceConfig {
            uri: "https://api.example.com".to_string(),
            scopes: vec!["read".to_string()],
        }]);
        let err = manager
            .resolve(&["https://api.example.com#frag".to_string()])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTarget);
    }
}
