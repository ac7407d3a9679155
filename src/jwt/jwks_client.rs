// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Remote JWKS retrieval
//!
//! Fetches JSON Web Key Sets published by clients (`jwks_uri`) and trusted
//! assertion issuers, through the SSRF-guarded [`OutboundFetcher`].
//!
//! Documents are cached per URL for a configured duration. Concurrent
//! cache misses for the same URL are coalesced: the first caller fetches
//! while the others wait on the per-URL slot, then read the fresh entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use super::keys::JwkKeySet;
use crate::utility::{FetchError, OutboundFetcher};

struct CacheEntry {
    fetched_at: Instant,
    keys: JwkKeySet,
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

/// Caching JWKS client.
pub struct JwksClient {
    fetcher: OutboundFetcher,
    cache_ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl JwksClient {
    pub fn new(fetcher: OutboundFetcher, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache_ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the key set at `url`, from cache when fresh.
    pub async fn get(&self, url: &str) -> Result<JwkKeySet, FetchError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots.entry(url.to_string()).or_default().clone()
        };

        // One fetch per URL at a time; latecomers block here and then see
        // the entry the winner wrote.
        let mut guard = slot.lock().await;
        if let Some(entry) = guard.as_ref() {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                return Ok(entry.keys.clone());
            }
        }

        debug!("Fetching JWKS from {}", url);
        let body = self.fetcher.fetch_json(url).await?;
        let keys: JwkKeySet = serde_json::from_value(body)
            .map_err(|_| FetchError::MalformedBody(url.to_string()))?;

        *guard = Some(CacheEntry {
            fetched_at: Instant::now(),
            keys: keys.clone(),
        });
        Ok(keys)
    }

    /// Drop the cached document for `url`, forcing the next `get` to fetch.
    pub fn invalidate(&self, url: &str) {
        self.slots.lock().unwrap().remove(url);
    }
}
