// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Session store
//!
//! Server-side sessions track which clients participated in an
//! authentication session. End-session uses the participant list to fan
//! out front- and back-channel logout; the check-session iframe hashes the
//! OP browser state salt stored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MemoryStore, TtlStore};
use crate::utility::Clock;

/// A server-side session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (`sid` of logout tokens).
    pub session_id: String,

    /// Authenticated subject.
    pub subject: String,

    /// Clients that obtained an authorization in this session.
    pub clients: Vec<String>,

    /// OP browser state salt, mixed into `session_state` values.
    pub opbs: String,

    /// Last activity, refreshed whenever the session is touched.
    pub last_seen: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: MemoryStore<Session>,
    clock: Arc<dyn Clock>,
    ttl: i64,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: i64) -> Self {
        Self {
            sessions: MemoryStore::new(clock.clone()),
            clock,
            ttl,
        }
    }

    /// Create or refresh the session and return it.
    pub async fn upsert(&self, session_id: &str, subject: &str) -> Session {
        let session = match self.sessions.get(session_id).await {
            Some(mut existing) => {
                existing.last_seen = self.clock.now();
                existing
            }
            None => Session {
                session_id: session_id.to_string(),
                subject: subject.to_string(),
                clients: Vec::new(),
                opbs: crate::utility::random::opaque_token(16),
                last_seen: self.clock.now(),
            },
        };
        self.sessions.put(session_id, session.clone(), self.ttl).await;
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).await
    }

    /// Record that `client_id` participated in the session.
    pub async fn add_client(&self, session_id: &str, client_id: &str) {
        if let Some(mut session) = self.sessions.get(session_id).await {
            if !session.clients.iter().any(|c| c == client_id) {
                session.clients.push(client_id.to_string());
            }
            session.last_seen = self.clock.now();
            self.sessions.put(session_id, session, self.ttl).await;
        }
    }

    /// End the session, returning it for logout fan-out.
    pub async fn end(&self, session_id: &str) -> Option<Session> {
        self.sessions.try_get_and_remove(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::SystemClock;

    #[tokio::test]
    async fn participants_accumulate_once() {
        let store = SessionStore::new(Arc::new(SystemClock), 3600);
        store.upsert("sid-1", "user-1").await;
        store.add_client("sid-1", "app-a").await;
        store.add_client("sid-1", "app-b").await;
        store.add_client("sid-1", "app-a").await;

        let session = store.get("sid-1").await.unwrap();
        assert_eq!(session.clients, vec!["app-a", "app-b"]);

        let ended = store.end("sid-1").await.unwrap();
        assert_eq!(ended.clients.len(), 2);
        assert!(store.get("sid-1").await.is_none());
    }
}
