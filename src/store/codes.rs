// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Authorization code store
//!
//! Codes are opaque high-entropy keys over an [`AuthorizationContext`]
//! with a short TTL. Redemption is atomic; after a successful redemption a
//! consumption marker (with the `jti` values minted from the code) is kept
//! so a replayed code can be detected and every descendant token revoked
//! (RFC 6749 §4.1.2).

use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::oidc::context::AuthorizationContext;
use crate::utility::Clock;

pub struct CodeStore {
    codes: MemoryStore<AuthorizationContext>,
    /// `code → jti values minted from it`, kept past consumption.
    consumed: MemoryStore<Vec<String>>,
}

impl CodeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            codes: MemoryStore::new(clock.clone()),
            consumed: MemoryStore::new(clock),
        }
    }

    /// Store a freshly minted code.
    pub async fn insert(&self, code: &str, context: AuthorizationContext, ttl: i64) {
        self.codes.put(code, context, ttl).await;
    }

    /// Atomically redeem a code. Exactly one caller gets the context.
    pub async fn redeem(&self, code: &str) -> Option<AuthorizationContext> {
        self.codes.try_get_and_remove(code).await
    }

    /// Record the tokens minted from a redeemed code. The marker lives for
    /// `ttl` seconds (the longest lifetime among the minted tokens).
    pub async fn mark_consumed(&self, code: &str, jtis: Vec<String>, ttl: i64) {
        self.consumed.put(code, jtis, ttl).await;
    }

    /// The tokens minted from `code`, when the code was already redeemed.
    ///
    /// A `Some` here on a redemption attempt means replay: the caller must
    /// fail the request and revoke the returned tokens.
    pub async fn consumed_tokens(&self, code: &str) -> Option<Vec<String>> {
        self.consumed.get(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::SystemClock;

    fn context() -> AuthorizationContext {
        AuthorizationContext {
            subject: Some("user-1".to_string()),
            client_id: "client".to_string(),
            scopes: vec!["openid".to_string()],
            resources: Vec::new(),
            claims: None,
            nonce: None,
            acr: None,
            amr: Vec::new(),
            auth_time: None,
            session_id: None,
            redirect_uri: None,
            code_challenge: None,
            code_challenge_method: None,
        }
    }

    #[tokio::test]
    async fn second_redemption_fails() {
        let store = CodeStore::new(Arc::new(SystemClock));
        store.insert("abc", context(), 60).await;

        assert!(store.redeem("abc").await.is_some());
        assert!(store.redeem("abc").await.is_none());
    }

    #[tokio::test]
    async fn consumption_marker_reports_minted_tokens() {
        let store = CodeStore::new(Arc::new(SystemClock));
        store.insert("abc", context(), 60).await;
        store.redeem("abc").await.unwrap();
        store
            .mark_consumed("abc", vec!["jti-1".to_string(), "jti-2".to_string()], 3600)
            .await;

        assert_eq!(
            store.consumed_tokens("abc").await,
            Some(vec!["jti-1".to_string(), "jti-2".to_string()])
        );
    }
}
