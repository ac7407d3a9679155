// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Route templates
//!
//! Endpoint paths are configurable through templates containing
//! `[route:<key>?<fallback>]` fragments. Fragments resolve recursively
//! against the route table until the result is a fixed point with no
//! fragments left; unknown keys without a fallback and circular
//! references are reported as errors, never silently dropped.
//!
//! ## Example
//!
//! ```rust
//! use rust_oidc_server::routes::RouteResolver;
//! use std::collections::HashMap;
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("base".to_string(), "~/custom-connect".to_string());
//! let resolver = RouteResolver::new(overrides);
//! assert_eq!(
//!     resolver.resolve("[route:authorize]").unwrap(),
//!     "~/custom-connect/authorize",
//! );
//! ```

use std::collections::HashMap;
use thiserror::Error;

/// Route resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Route {0:?} is not defined and the template has no fallback")]
    UnknownRoute(String),

    #[error("Route {0:?} participates in a circular dependency")]
    CircularDependency(String),
}

/// Route table with template resolution.
pub struct RouteResolver {
    templates: HashMap<String, String>,
}

/// Keys of all built-in endpoints, used by discovery and the server
/// builder.
pub const ENDPOINT_KEYS: &[&str] = &[
    "authorize",
    "token",
    "userinfo",
    "introspection",
    "revocation",
    "endsession",
    "checksession",
    "par",
    "device_authorization",
    "bc_authorize",
    "register",
    "jwks",
];

fn default_templates() -> HashMap<String, String> {
    let defaults = [
        ("base", "~/connect"),
        ("authorize", "[route:base]/authorize"),
        ("token", "[route:base]/token"),
        ("userinfo", "[route:base]/userinfo"),
        ("introspection", "[route:base]/introspect"),
        ("revocation", "[route:base]/revoke"),
        ("endsession", "[route:base]/endsession"),
        ("checksession", "[route:base]/checksession"),
        ("par", "[route:base]/par"),
        ("device_authorization", "[route:base]/deviceauthorization"),
        ("device_verification", "[route:base]/device"),
        ("bc_authorize", "[route:base]/bc-authorize"),
        ("register", "[route:base]/register"),
        ("discovery", "~/.well-known/openid-configuration"),
        ("jwks", "~/.well-known/jwks"),
    ];
    defaults
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl RouteResolver {
    /// Build the table from the defaults plus configuration overrides.
    pub fn new(overrides: HashMap<String, String>) -> Self {
        let mut templates = default_templates();
        templates.extend(overrides);
        Self { templates }
    }

    /// Resolve the template registered under `key`.
    pub fn resolve_key(&self, key: &str) -> Result<String, RouteError> {
        let mut stack = Vec::new();
        self.resolve_key_inner(key, &mut stack)
    }

    /// Resolve every `[route:…]` fragment of `template`.
    pub fn resolve(&self, template: &str) -> Result<String, RouteError> {
        let mut stack = Vec::new();
        self.resolve_inner(template, &mut stack)
    }

    /// The mountable path for `key`: resolved, with the `~` application
    /// root marker stripped.
    pub fn path(&self, key: &str) -> Result<String, RouteError> {
        let resolved = self.resolve_key(key)?;
        Ok(resolved.strip_prefix('~').unwrap_or(&resolved).to_string())
    }

    fn resolve_key_inner(
        &self,
        key: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, RouteError> {
        if stack.iter().any(|k| k == key) {
            return Err(RouteError::CircularDependency(key.to_string()));
        }
        let template = self
            .templates
            .get(key)
            .ok_or_else(|| RouteError::UnknownRoute(key.to_string()))?
            .clone();
        stack.push(key.to_string());
        let resolved = self.resolve_inner(&template, stack)?;
        stack.pop();
        Ok(resolved)
    }

    fn resolve_inner(
        &self,
        template: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, RouteError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("[route:") {
            out.push_str(&rest[..start]);
            let after = &rest[start + "[route:".len()..];
            let end = after.find(']').ok_or_else(|| {
                // An unterminated fragment is a configuration typo; treat
                // the dangling text as the unknown route name.
                RouteError::UnknownRoute(after.to_string())
            })?;
            let fragment = &after[..end];

            let (key, fallback) = match fragment.split_once('?') {
                Some((key, fallback)) => (key, Some(fallback)),
                None => (fragment, None),
            };

            match self.resolve_key_inner(key, stack) {
                Ok(resolved) => out.push_str(&resolved),
                Err(RouteError::UnknownRoute(_)) if fallback.is_some() => {
                    let resolved = self.resolve_inner(fallback.unwrap(), stack)?;
                    out.push_str(&resolved);
                }
                Err(e) => return Err(e),
            }

            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl Default for RouteResolver {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(pairs: &[(&str, &str)]) -> RouteResolver {
        RouteResolver::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn default_routes_resolve() {
        let routes = RouteResolver::default();
        assert_eq!(routes.resolve_key("authorize").unwrap(), "~/connect/authorize");
        assert_eq!(routes.path("token").unwrap(), "/connect/token");
        assert_eq!(
            routes.path("discovery").unwrap(),
            "/.well-known/openid-configuration"
        );
    }

    #[test]
    fn overrides_rebase_every_dependent_route() {
        let routes = resolver(&[("base", "~/custom-connect")]);
        assert_eq!(
            routes.resolve("[route:authorize]").unwrap(),
            "~/custom-connect/authorize"
        );
    }

    #[test]
    fn fallback_is_used_for_unknown_routes() {
        let routes = RouteResolver::default();
        assert_eq!(
            routes.resolve("[route:missing?/default-path]").unwrap(),
            "/default-path"
        );
    }

    #[test]
    fn unknown_route_without_fallback_errors() {
        let routes = RouteResolver::default();
        assert_eq!(
            routes.resolve("[route:missing]").unwrap_err(),
            RouteError::UnknownRoute("missing".to_string())
        );
    }

    #[test]
    fn circular_dependency_is_detected() {
        let routes = resolver(&[("a", "[route:b]"), ("b", "[route:a]")]);
        assert!(matches!(
            routes.resolve("[route:a]").unwrap_err(),
            RouteError::CircularDependency(_)
        ));
    }

    #[test]
    fn resolution_reaches_a_fixed_point() {
        let routes = resolver(&[("deep", "[route:base]/x/[route:token]")]);
        let resolved = routes.resolve_key("deep").unwrap();
        assert!(!resolved.contains("[route:"), "{resolved}");
    }
}
