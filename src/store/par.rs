// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Pushed authorization request store (RFC 9126)
//!
//! Stored parameter sets keyed by the identifier fragment of the
//! `urn:ietf:params:oauth:request_uri:<id>` handle. Records are consumed
//! exactly once at the authorization endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::utility::Clock;

/// URN prefix of pushed request handles.
pub const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

/// A stored pushed authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedAuthorizationRequest {
    /// Client that pushed the request; the authorization request must come
    /// from the same client.
    pub client_id: String,

    /// The full pushed parameter set.
    pub parameters: HashMap<String, String>,
}

pub struct ParStore {
    requests: MemoryStore<PushedAuthorizationRequest>,
}

impl ParStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: MemoryStore::new(clock),
        }
    }

    /// Store a pushed request under a fresh identifier, returning the full
    /// `request_uri` handle.
    pub async fn insert(&self, request: PushedAuthorizationRequest, ttl: i64) -> String {
        let id = crate::utility::random::opaque_token(32);
        self.requests.put(&id, request, ttl).await;
        format!("{REQUEST_URI_PREFIX}{id}")
    }

    /// Atomically consume the record behind `request_uri`. One-time use.
    pub async fn consume(&self, request_uri: &str) -> Option<PushedAuthorizationRequest> {
        let id = request_uri.strip_prefix(REQUEST_URI_PREFIX)?;
        self.requests.try_get_and_remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::SystemClock;

    #[tokio::test]
    async fn handles_are_single_use() {
        let store = ParStore::new(Arc::new(SystemClock));
        let handle = store
            .insert(
                PushedAuthorizationRequest {
                    client_id: "app".to_string(),
                    parameters: HashMap::new(),
                },
                90,
            )
            .await;

        assert!(handle.starts_with(REQUEST_URI_PREFIX));
        assert!(store.consume(&handle).await.is_some());
        assert!(store.consume(&handle).await.is_none());
    }

    #[tokio::test]
    async fn foreign_uris_do_not_resolve() {
        let store = ParStore::new(Arc::new(SystemClock));
        assert!(store.consume("https://example.com/request.jwt").await.is_none());
    }
}
