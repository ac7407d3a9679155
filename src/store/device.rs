// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Device authorization store (RFC 8628)
//!
//! Records are keyed by the high-entropy `device_code` and indexed by the
//! short `user_code` the end user types. The status machine is
//! `Pending → Authorized | Denied`; redemption at the token endpoint
//! consumes the record atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::oidc::context::AuthorizationContext;
use crate::utility::Clock;

/// Status of a pending device authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Pending,
    Authorized,
    Denied,
}

/// A device authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationRequest {
    pub device_code: String,
    pub user_code: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub resources: Vec<String>,
    pub status: DeviceStatus,

    /// Earliest instant the client may poll again.
    pub next_poll_at: DateTime<Utc>,

    /// Set on approval; the grant tokens are minted from.
    pub grant: Option<AuthorizationContext>,
}

pub struct DeviceStore {
    devices: MemoryStore<DeviceAuthorizationRequest>,
    /// `user_code → device_code`.
    user_index: MemoryStore<String>,
}

impl DeviceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            devices: MemoryStore::new(clock.clone()),
            user_index: MemoryStore::new(clock),
        }
    }

    pub async fn insert(&self, request: DeviceAuthorizationRequest, ttl: i64) {
        let device_code = request.device_code.clone();
        self.user_index
            .put(&request.user_code, device_code.clone(), ttl)
            .await;
        self.devices.put(&device_code, request, ttl).await;
    }

    pub async fn get(&self, device_code: &str) -> Option<DeviceAuthorizationRequest> {
        self.devices.get(device_code).await
    }

    pub async fn find_by_user_code(&self, user_code: &str) -> Option<DeviceAuthorizationRequest> {
        let device_code = self.user_index.get(user_code).await?;
        self.devices.get(&device_code).await
    }

    /// Record a poll and the next allowed polling instant.
    pub async fn record_poll(&self, device_code: &str, next_poll_at: DateTime<Utc>) {
        if let Some(mut request) = self.devices.get(device_code).await {
            request.next_poll_at = next_poll_at;
            self.devices.update(device_code, request).await;
        }
    }

    /// Approve the request identified by `user_code`, attaching the grant
    /// tokens will be minted from. Returns `false` when the code is
    /// unknown, expired, or no longer pending.
    pub async fn approve(&self, user_code: &str, grant: AuthorizationContext) -> bool {
        self.transition(user_code, DeviceStatus::Authorized, Some(grant))
            .await
    }

    /// Deny the request identified by `user_code`.
    pub async fn deny(&self, user_code: &str) -> bool {
        self.transition(user_code, DeviceStatus::Denied, None).await
    }

    async fn transition(
        &self,
        user_code: &str,
        status: DeviceStatus,
        grant: Option<AuthorizationContext>,
    ) -> bool {
        let Some(device_code) = self.user_index.get(user_code).await else {
            return false;
        };
        let Some(mut request) = self.devices.get(&device_code).await else {
            return false;
        };
        if request.status != DeviceStatus::Pending {
            return false;
        }
        request.status = status;
        request.grant = grant;
        self.devices.update(&device_code, request).await
    }

    /// Atomically consume an authorized request at redemption time.
    pub async fn consume(&self, device_code: &str) -> Option<DeviceAuthorizationRequest> {
        let request = self.devices.try_get_and_remove(device_code).await?;
        self.user_index.delete(&request.user_code).await;
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::SystemClock;

    fn request() -> DeviceAuthorizationRequest {
        DeviceAuthorizationRequest {
            device_code: "dev-1".to_string(),
            user_code: "BCDF-GHJK".to_string(),
            client_id: "tv-app".to_string(),
            scopes: vec!["openid".to_string()],
            resources: Vec::new(),
            status: DeviceStatus::Pending,
            next_poll_at: Utc::now(),
            grant: None,
        }
    }

    fn grant() -> AuthorizationContext {
        AuthorizationContext {
            subject: Some("user-1".to_string()),
            client_id: "tv-app".to_string(),
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
    async fn approval_transitions_only_pending_requests() {
        let store = DeviceStore::new(Arc::new(SystemClock));
        store.insert(request(), 300).await;

        assert!(store.approve("BCDF-GHJK", grant()).await);
        // A second decision must not overwrite the first.
        assert!(!store.deny("BCDF-GHJK").await);

        let stored = store.get("dev-1").await.unwrap();
        assert_eq!(stored.status, DeviceStatus::Authorized);
        assert!(stored.grant.is_some());
    }

    #[tokio::test]
    async fn consume_removes_both_indexes() {
        let store = DeviceStore::new(Arc::new(SystemClock));
        store.insert(request(), 300).await;

        assert!(store.consume("dev-1").await.is_some());
        assert!(store.consume("dev-1").await.is_none());
        assert!(store.find_by_user_code("BCDF-GHJK").await.is_none());
    }
}
