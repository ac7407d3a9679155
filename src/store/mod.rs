// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Stores and registries
//!
//! Protocol state lives in TTL-bound stores addressed by opaque keys. The
//! [`TtlStore`] contract is what a persistent backend must provide; the
//! in-process [`MemoryStore`] is the reference implementation and the test
//! backend.
//!
//! The one hard rule: redemption of single-use artifacts (authorization
//! codes, device codes, CIBA requests, pushed requests, assertion `jti`
//! values) goes through `try_get_and_remove`, which must be atomic —
//! exactly one caller wins, every other caller sees `None`.

pub mod ciba;
pub mod clients;
pub mod codes;
pub mod device;
pub mod par;
pub mod replay;
pub mod session;
pub mod token_registry;

pub use ciba::{CibaAuthRequest, CibaStatus, CibaStore};
pub use clients::{ClientInfo, ClientStore};
pub use codes::CodeStore;
pub use device::{DeviceAuthorizationRequest, DeviceStatus, DeviceStore};
pub use par::{ParStore, PushedAuthorizationRequest, REQUEST_URI_PREFIX};
pub use replay::ReplayCache;
pub use session::{Session, SessionStore};
pub use token_registry::{TokenRegistry, TokenStatus};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::utility::Clock;

/// Contract every store backend implements.
#[async_trait]
pub trait TtlStore<V: Clone + Send + Sync + 'static>: Send + Sync {
    /// Store `value` under `key` for `ttl` seconds, replacing any previous
    /// value.
    async fn put(&self, key: &str, value: V, ttl: i64);

    /// Read the live value under `key`.
    async fn get(&self, key: &str) -> Option<V>;

    /// Replace the value under `key`, keeping its expiry. Returns `false`
    /// when the key is absent or expired.
    async fn update(&self, key: &str, value: V) -> bool;

    /// Remove `key`. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Atomically read and remove the live value under `key`.
    ///
    /// This is the redemption primitive: concurrent callers for the same
    /// key see exactly one `Some`.
    async fn try_get_and_remove(&self, key: &str) -> Option<V>;
}

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// In-process store backend.
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync + 'static> MemoryStore<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn live<'a>(&self, entry: Option<&'a Entry<V>>) -> Option<&'a Entry<V>> {
        entry.filter(|e| e.expires_at > self.clock.now())
    }

    /// Insert only when no live value exists under `key`, atomically.
    /// Returns whether the insert happened.
    pub async fn put_if_absent(&self, key: &str, value: V, ttl: i64) -> bool {
        let mut entries = self.entries.write().await;
        let now = self.clock.now();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return false;
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + Duration::seconds(ttl),
            },
        );
        true
    }

    /// Drop expired entries. Called opportunistically on writes.
    async fn purge(&self) {
        let now = self.clock.now();
        self.entries.write().await.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> TtlStore<V> for MemoryStore<V> {
    async fn put(&self, key: &str, value: V, ttl: i64) {
        self.purge().await;
        let entry = Entry {
            value,
            expires_at: self.clock.now() + Duration::seconds(ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        self.live(entries.get(key)).map(|e| e.value.clone())
    }

    async fn update(&self, key: &str, value: V) -> bool {
        let mut entries = self.entries.write().await;
        let now = self.clock.now();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.value = value;
                true
            }
            _ => false,
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.entries.write().await.remove(key) {
            Some(entry) => entry.expires_at > now,
            None => false,
        }
    }

    async fn try_get_and_remove(&self, key: &str) -> Option<V> {
        // The whole get-and-remove happens under the write lock.
        let mut entries = self.entries.write().await;
        let entry = entries.remove(key)?;
        if entry.expires_at > self.clock.now() {
            Some(entry.value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::{ManualClock, SystemClock};

    #[tokio::test]
    async fn values_expire() {
        let clock = ManualClock::new(Utc::now());
        let store: MemoryStore<String> = MemoryStore::new(Arc::new(clock.clone()));

        store.put("k", "v".to_string(), 60).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));

        clock.advance(61);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.try_get_and_remove("k").await, None);
    }

    #[tokio::test]
    async fn update_keeps_expiry() {
        let clock = ManualClock::new(Utc::now());
        let store: MemoryStore<i32> = MemoryStore::new(Arc::new(clock.clone()));

        store.put("k", 1, 60).await;
        assert!(store.update("k", 2).await);
        clock.advance(61);
        assert!(!store.update("k", 3).await);
    }

    #[tokio::test]
    async fn exactly_one_concurrent_redeemer_wins() {
        let store: Arc<MemoryStore<String>> = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
        store.put("code", "ctx".to_string(), 60).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_get_and_remove("code").await.is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
