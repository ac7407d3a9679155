// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # CIBA request store
//!
//! Backchannel authentication requests keyed by `auth_req_id`, with the
//! same `pending → authorized | denied` machine as device authorization
//! and the same atomic consumption at the token endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::oidc::context::AuthorizationContext;
use crate::utility::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CibaStatus {
    Pending,
    Authorized,
    Denied,
}

/// A backchannel authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CibaAuthRequest {
    pub auth_req_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub resources: Vec<String>,

    /// Hint that identified the end user (`login_hint` or the subject of a
    /// verified `login_hint_token` / `id_token_hint`).
    pub login_hint: String,

    /// Message shown on the authentication device when provided.
    pub binding_message: Option<String>,

    pub status: CibaStatus,

    /// Earliest instant the client may poll again.
    pub next_poll_at: DateTime<Utc>,

    /// Set on approval.
    pub grant: Option<AuthorizationContext>,
}

pub struct CibaStore {
    requests: MemoryStore<CibaAuthRequest>,
}

impl CibaStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: MemoryStore::new(clock),
        }
    }

    pub async fn insert(&self, request: CibaAuthRequest, ttl: i64) {
        let auth_req_id = request.auth_req_id.clone();
        self.requests.put(&auth_req_id, request, ttl).await;
    }

    pub async fn get(&self, auth_req_id: &str) -> Option<CibaAuthRequest> {
        self.requests.get(auth_req_id).await
    }

    pub async fn record_poll(&self, auth_req_id: &str, next_poll_at: DateTime<Utc>) {
        if let Some(mut request) = self.requests.get(auth_req_id).await {
            request.next_poll_at = next_poll_at;
            self.requests.update(auth_req_id, request).await;
        }
    }

    /// Approve a pending request, attaching the grant.
    pub async fn approve(&self, auth_req_id: &str, grant: AuthorizationContext) -> bool {
        self.transition(auth_req_id, CibaStatus::Authorized, Some(grant))
            .await
    }

    pub async fn deny(&self, auth_req_id: &str) -> bool {
        self.transition(auth_req_id, CibaStatus::Denied, None).await
    }

    async fn transition(
        &self,
        auth_req_id: &str,
        status: CibaStatus,
        grant: Option<AuthorizationContext>,
    ) -> bool {
        let Some(mut request) = self.requests.get(auth_req_id).await else {
            return false;
        };
        if request.status != CibaStatus::Pending {
            return false;
        }
        request.status = status;
        request.grant = grant;
        self.requests.update(auth_req_id, request).await
    }

    /// Atomically consume an authorized request.
    pub async fn consume(&self, auth_req_id: &str) -> Option<CibaAuthRequest> {
        self.requests.try_get_and_remove(auth_req_id).await
    }
}
