// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Assertion replay cache
//!
//! Remembers the `jti` of every accepted JWT assertion (client
//! authentication assertions and JWT-bearer grants) until the assertion's
//! `exp`. A second assertion with a remembered `jti` is a replay.

use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::utility::Clock;

pub struct ReplayCache {
    seen: MemoryStore<()>,
    clock: Arc<dyn Clock>,
}

impl ReplayCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: MemoryStore::new(clock.clone()),
            clock,
        }
    }

    /// Record `jti` until `exp`. Returns `true` when the value was fresh,
    /// `false` on replay.
    ///
    /// Check and insert happen under one write lock, so two concurrent
    /// presentations of the same assertion cannot both pass.
    pub async fn check_and_store(&self, jti: &str, exp: i64) -> bool {
        let ttl = (exp - self.clock.now_ts()).max(1);
        // try_get_and_remove + put would leave a window; MemoryStore::put
        // replaces unconditionally, so probe under the same lock instead.
        self.seen.put_if_absent(jti, (), ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::{Clock as _, ManualClock};
    use chrono::Utc;

    #[tokio::test]
    async fn second_presentation_is_replay() {
        let clock = ManualClock::new(Utc::now());
        let cache = ReplayCache::new(Arc::new(clock.clone()));
        let exp = clock.now_ts() + 60;

        assert!(cache.check_and_store("jti-1", exp).await);
        assert!(!cache.check_and_store("jti-1", exp).await);
    }

    #[tokio::test]
    async fn jti_is_reusable_after_exp() {
        let clock = ManualClock::new(Utc::now());
        let cache = ReplayCache::new(Arc::new(clock.clone()));
        let exp = clock.now_ts() + 60;

        assert!(cache.check_and_store("jti-1", exp).await);
        clock.advance(61);
        assert!(cache.check_and_store("jti-1", clock.now_ts() + 60).await);
    }
}
