// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TTLs and polling intervals for protocol artifacts.

use serde::{Deserialize, Serialize};

/// Lifetimes, all in seconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimesConfig {
    /// Authorization code TTL. Codes are single use regardless of TTL.
    #[serde(default = "default_code_ttl")]
    pub authorization_code_ttl: i64,

    /// Device authorization request TTL (`expires_in` of RFC 8628).
    #[serde(default = "default_device_ttl")]
    pub device_code_ttl: i64,

    /// Minimum polling interval for device and CIBA grants.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: i64,

    /// CIBA auth_req_id TTL.
    #[serde(default = "default_ciba_ttl")]
    pub ciba_request_ttl: i64,

    /// Pushed authorization request TTL. Capped at 90 seconds.
    #[serde(default = "default_par_ttl")]
    pub pushed_request_ttl: i64,

    /// ID token lifetime.
    #[serde(default = "default_id_token_ttl")]
    pub id_token_ttl: i64,

    /// Maximum accepted request-object lifetime (`exp - nbf`).
    #[serde(default = "default_request_object_ttl")]
    pub request_object_max_ttl: i64,

    /// Clock skew tolerated when validating `iat`/`nbf`.
    #[serde(default = "default_skew")]
    pub clock_skew: i64,

    /// User-code verification rate limit: attempts per window.
    #[serde(default = "default_rate_attempts")]
    pub user_code_max_attempts: u32,

    /// User-code verification rate limit window.
    #[serde(default = "default_rate_window")]
    pub user_code_attempt_window: i64,

    /// Alphabet user codes are drawn from. Upper-case consonants by
    /// default; every character must be unambiguous on a TV screen.
    #[serde(default = "default_user_code_alphabet")]
    pub user_code_alphabet: String,
}

impl LifetimesConfig {
    /// PAR TTL with the protocol cap applied.
    pub fn effective_par_ttl(&self) -> i64 {
        self.pushed_request_ttl.min(90)
    }
}

impl Default for LifetimesConfig {
    fn default() -> Self {
        Self {
            authorization_code_ttl: default_code_ttl(),
            device_code_ttl: default_device_ttl(),
            poll_interval: default_poll_interval(),
            ciba_request_ttl: default_ciba_ttl(),
            pushed_request_ttl: default_par_ttl(),
            id_token_ttl: default_id_token_ttl(),
            request_object_max_ttl: default_request_object_ttl(),
            clock_skew: default_skew(),
            user_code_max_attempts: default_rate_attempts(),
            user_code_attempt_window: default_rate_window(),
            user_code_alphabet: default_user_code_alphabet(),
        }
    }
}

fn default_user_code_alphabet() -> String {
    crate::utility::random::USER_CODE_ALPHABET.to_string()
}

fn default_code_ttl() -> i64 {
    60
}

fn default_device_ttl() -> i64 {
    300
}

fn default_poll_interval() -> i64 {
    5
}

fn default_ciba_ttl() -> i64 {
    300
}

fn default_par_ttl() -> i64 {
    90
}

fn default_id_token_ttl() -> i64 {
    300
}

fn default_request_object_ttl() -> i64 {
    3600
}

fn default_skew() -> i64 {
    60
}

fn default_rate_attempts() -> u32 {
    5
}

fn default_rate_window() -> i64 {
    300
}
