// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Token registry
//!
//! Tracks the status of every issued token by `jti` until the token's
//! `exp`. Revocation flips the status to `Revoked` without extending the
//! TTL, so a revoked entry disappears exactly when the token would have
//! expired anyway.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::utility::Clock;

/// Lifecycle status of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    /// Issued and usable.
    Issued,

    /// Consumed by rotation; reuse is a protocol violation.
    Used,

    /// Explicitly revoked.
    Revoked,
}

/// `jti → status` registry.
pub struct TokenRegistry {
    store: MemoryStore<TokenStatus>,
    clock: Arc<dyn Clock>,
}

impl TokenRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: MemoryStore::new(clock.clone()),
            clock,
        }
    }

    /// Register a freshly issued token until `exp` (Unix seconds).
    pub async fn register(&self, jti: &str, exp: i64) {
        let ttl = exp - self.clock.now_ts();
        if ttl > 0 {
            self.store.put(jti, TokenStatus::Issued, ttl).await;
        }
    }

    /// Current status. `None` when unknown or past `exp`.
    pub async fn status(&self, jti: &str) -> Option<TokenStatus> {
        self.store.get(jti).await
    }

    /// Mark a token as consumed by rotation.
    pub async fn mark_used(&self, jti: &str) -> bool {
        self.store.update(jti, TokenStatus::Used).await
    }

    /// Revoke a token. Succeeds silently when the token is unknown or
    /// already expired (RFC 7009 §2.2).
    pub async fn revoke(&self, jti: &str) {
        if !self.store.update(jti, TokenStatus::Revoked).await {
            log::debug!("Revocation of unknown or expired jti {jti:?} ignored");
        }
    }

    /// Whether the token is currently usable.
    pub async fn is_active(&self, jti: &str) -> bool {
        matches!(self.status(jti).await, Some(TokenStatus::Issued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::ManualClock;
    use chrono::Utc;

    #[tokio::test]
    async fn revoked_status_survives_until_expiry() {
        let clock = ManualClock::new(Utc::now());
        let registry = TokenRegistry::new(Arc::new(clock.clone()));

        let exp = clock.now_ts() + 100;
        registry.register("jti-1", exp).await;
        registry.revoke("jti-1").await;

        assert_eq!(registry.status("jti-1").await, Some(TokenStatus::Revoked));
        assert!(!registry.is_active("jti-1").await);

        clock.advance(101);
        assert_eq!(registry.status("jti-1").await, None);
    }

    #[tokio::test]
    async fn rotation_marks_old_jti_used() {
        let clock = ManualClock::new(Utc::now());
        let registry = TokenRegistry::new(Arc::new(clock.clone()));

        registry.register("old", clock.now_ts() + 100).await;
        assert!(registry.mark_used("old").await);
        assert_eq!(registry.status("old").await, Some(TokenStatus::Used));
    }
}
