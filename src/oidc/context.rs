// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization bindings
//!
//! [`AuthorizationContext`] is the bound outcome of a successful
//! authorization. It is carried verbatim across every persistent artifact
//! that can later mint tokens — authorization codes, refresh tokens,
//! device requests, CIBA requests — so re-issuance always reproduces the
//! original subject, client, scope and resource bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user authentication handed to the engine by the host.
///
/// Immutable once created; the engine never authenticates users itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Authenticated subject identifier (local, pre-pairwise).
    pub subject: String,

    /// When the authentication happened.
    pub auth_time: DateTime<Utc>,

    /// Authentication context class reference.
    #[serde(default)]
    pub acr: Option<String>,

    /// Authentication method references.
    #[serde(default)]
    pub amr: Vec<String>,

    /// Server-side session identifier used for logout tracking.
    pub session_id: String,
}

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl CodeChallengeMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "S256" => Some(Self::S256),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

/// The bound outcome of a successful authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// Subject the grant belongs to. `None` for `client_credentials`.
    pub subject: Option<String>,

    /// Client the grant was issued to.
    pub client_id: String,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Granted resources, used as token audiences.
    pub resources: Vec<String>,

    /// Requested claims (OIDC `claims` parameter), passed through to
    /// UserInfo.
    #[serde(default)]
    pub claims: Option<serde_json::Value>,

    /// Nonce to echo into ID tokens.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Authentication context class of the underlying session.
    #[serde(default)]
    pub acr: Option<String>,

    /// Authentication method references of the underlying session.
    #[serde(default)]
    pub amr: Vec<String>,

    /// When the user authenticated, as a Unix timestamp.
    #[serde(default)]
    pub auth_time: Option<i64>,

    /// Server-side session the authorization happened in.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Redirect URI the authorization was bound to; token requests must
    /// repeat it exactly.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE challenge, when the flow was PKCE-protected.
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE challenge method.
    #[serde(default)]
    pub code_challenge_method: Option<CodeChallengeMethod>,
}

impl AuthorizationContext {
    /// Space-separated scope string for the `scope` claim.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Whether `offline_access` was granted.
    pub fn offline_access(&self) -> bool {
        self.scopes.iter().any(|s| s == "offline_access")
    }
}
