// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Engine state
//!
//! [`OidcState`] aggregates everything the endpoint pipelines share: the
//! configuration, the clock, the key manager, the stores, the scope and
//! resource registries and the outbound fetchers. It is created once at
//! startup and shared across workers; all interior mutability lives in the
//! stores and the key manager.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::warn;

use super::scopes::{ResourceManager, ScopeManager};
use super::token::PasswordAuthenticator;
use super::userinfo::{NoUserInfo, UserInfoProvider};
use crate::config::Config;
use crate::jwt::{JwksClient, TokenSigner};
use crate::keys::KeyManager;
use crate::routes::RouteResolver;
use crate::store::{
    CibaStore, ClientStore, CodeStore, DeviceStore, ParStore, ReplayCache, SessionStore,
    TokenRegistry,
};
use crate::utility::{Clock, OutboundFetcher, SsrfPolicy, SystemClock};

/// Shared state of the protocol engine.
pub struct OidcState {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,

    pub keys: Arc<KeyManager>,
    pub signer: TokenSigner,

    pub clients: ClientStore,
    pub codes: CodeStore,
    pub devices: DeviceStore,
    pub ciba: CibaStore,
    pub par: ParStore,
    pub sessions: SessionStore,
    pub tokens: TokenRegistry,
    pub replay: ReplayCache,

    /// Fixed-window counters for user-code verification attempts.
    pub user_code_attempts: crate::store::MemoryStore<u32>,

    pub scopes: ScopeManager,
    pub resources: ResourceManager,

    pub routes: RouteResolver,

    pub fetcher: OutboundFetcher,
    pub jwks_client: JwksClient,

    /// Source of end-user claims for UserInfo.
    pub userinfo_provider: Arc<dyn UserInfoProvider>,

    /// Present only when the deployment enables the `password` grant.
    pub password_authenticator: Option<Arc<dyn PasswordAuthenticator>>,

    /// Salt mixed into pairwise subject derivation. Taken from
    /// `security.pairwise_salt`; generated (and warned about) when absent.
    pub pairwise_salt: String,
}

impl OidcState {
    /// Build the engine from configuration with production defaults.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the engine with an explicit clock (tests drive time by hand).
    pub fn with_clock(config: Arc<Config>, clock: Arc<dyn Clock>) -> Result<Self> {
        let keys = Arc::new(KeyManager::from_config(&config.security)?);
        let signer = TokenSigner::new(config.server.issuer.clone(), clock.clone());

        let fetcher = OutboundFetcher::new(SsrfPolicy::default());
        let jwks_client = JwksClient::new(
            fetcher.clone(),
            Duration::from_secs(config.security.jwks_cache_duration),
        );

        let pairwise_salt = match &config.security.pairwise_salt {
            Some(salt) => salt.clone(),
            None => {
                warn!(
                    "No pairwise_salt configured; pairwise subject identifiers \
                     will change on the next restart"
                );
                crate::utility::random::opaque_token(16)
            }
        };

        Ok(Self {
            clients: ClientStore::from_config(&config.access.clients),
            codes: CodeStore::new(clock.clone()),
            devices: DeviceStore::new(clock.clone()),
            ciba: CibaStore::new(clock.clone()),
            par: ParStore::new(clock.clone()),
            sessions: SessionStore::new(clock.clone(), 8 * 3600),
            tokens: TokenRegistry::new(clock.clone()),
            replay: ReplayCache::new(clock.clone()),
            user_code_attempts: crate::store::MemoryStore::new(clock.clone()),
            scopes: ScopeManager::from_config(&config.access.scopes),
            resources: ResourceManager::from_config(&config.access.resources),
            routes: RouteResolver::new(config.server.routes.clone()),
            fetcher,
            jwks_client,
            userinfo_provider: Arc::new(NoUserInfo),
            password_authenticator: None,
            pairwise_salt,
            keys,
            signer,
            clock,
            config,
        })
    }

    /// Replace the UserInfo claim source.
    pub fn with_userinfo_provider(mut self, provider: Arc<dyn UserInfoProvider>) -> Self {
        self.userinfo_provider = provider;
        self
    }

    /// Enable the `password` grant by injecting a credential checker.
    pub fn with_password_authenticator(
        mut self,
        authenticator: Arc<dyn PasswordAuthenticator>,
    ) -> Self {
        self.password_authenticator = Some(authenticator);
        self
    }

    /// Replace the outbound fetcher policy (tests allow loopback HTTP).
    pub fn with_fetcher(mut self, fetcher: OutboundFetcher) -> Self {
        self.jwks_client = JwksClient::new(
            fetcher.clone(),
            Duration::from_secs(self.config.security.jwks_cache_duration),
        );
        self.fetcher = fetcher;
        self
    }

    /// The issuer identifier.
    pub fn issuer(&self) -> &str {
        &self.config.server.issuer
    }

    /// Absolute URL of the endpoint registered under `route_key`, or
    /// `None` when the endpoint is disabled.
    pub fn endpoint_url(&self, route_key: &str) -> Option<String> {
        if self.is_endpoint_disabled(route_key) {
            return None;
        }
        let path = self.routes.path(route_key).ok()?;
        Some(format!(
            "{}{}",
            self.config.server.issuer.trim_end_matches('/'),
            path
        ))
    }

    pub fn is_endpoint_disabled(&self, route_key: &str) -> bool {
        self.config
            .server
            .disabled_endpoints
            .iter()
            .any(|e| e == route_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_pairwise_salt_survives_rebuilds() {
        let yaml = r#"
security:
  pairwise_salt: "stable-deployment-salt"
"#;
        let first = OidcState::from_config(Arc::new(Config::from_yaml(yaml).unwrap())).unwrap();
        let second = OidcState::from_config(Arc::new(Config::from_yaml(yaml).unwrap())).unwrap();

        assert_eq!(first.pairwise_salt, "stable-deployment-salt");
        assert_eq!(first.pairwise_salt, second.pairwise_salt);
    }
}
