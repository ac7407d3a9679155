// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Protocol error taxonomy
//!
//! The engine surfaces a single error type, [`OidcError`]: a code from the
//! OAuth 2.0 / OIDC error registries, a human-readable description, and
//! the pipeline stage that produced it. Handlers map it onto the wire
//! format (`error` / `error_description` JSON body or redirect
//! parameters).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Validate,
    Process,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Validate => "validate",
            Stage::Process => "process",
        }
    }
}

/// Error codes from the OAuth 2.0 and OIDC registries, plus the polling
/// codes used by the device and CIBA grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // RFC 6749 / RFC 8707.
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    InvalidTarget,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    AccessDenied,
    ServerError,
    TemporarilyUnavailable,

    // OIDC Core §3.1.2.6.
    LoginRequired,
    InteractionRequired,
    AccountSelectionRequired,
    ConsentRequired,
    RequestNotSupported,
    RequestUriNotSupported,
    RegistrationNotSupported,

    // RFC 7591.
    InvalidClientMetadata,
    InvalidRedirectUri,

    // RFC 6750 bearer-token errors (UserInfo).
    InvalidToken,
    InsufficientScope,

    // Polling flows (RFC 8628 §3.5, CIBA §11).
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::InvalidTarget => "invalid_target",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::ServerError => "server_error",
            ErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
            ErrorCode::LoginRequired => "login_required",
            ErrorCode::InteractionRequired => "interaction_required",
            ErrorCode::AccountSelectionRequired => "account_selection_required",
            ErrorCode::ConsentRequired => "consent_required",
            ErrorCode::RequestNotSupported => "request_not_supported",
            ErrorCode::RequestUriNotSupported => "request_uri_not_supported",
            ErrorCode::RegistrationNotSupported => "registration_not_supported",
            ErrorCode::InvalidClientMetadata => "invalid_client_metadata",
            ErrorCode::InvalidRedirectUri => "invalid_redirect_uri",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::InsufficientScope => "insufficient_scope",
            ErrorCode::AuthorizationPending => "authorization_pending",
            ErrorCode::SlowDown => "slow_down",
            ErrorCode::ExpiredToken => "expired_token",
        }
    }

    /// HTTP status for direct (non-redirect) error responses.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidClient | ErrorCode::InvalidToken => 401,
            ErrorCode::InsufficientScope => 403,
            ErrorCode::ServerError => 500,
            ErrorCode::TemporarilyUnavailable => 503,
            _ => 400,
        }
    }
}

/// The engine's error type.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{} ({}): {description}", .code.as_str(), .stage.as_str())]
pub struct OidcError {
    pub code: ErrorCode,
    pub description: String,
    pub stage: Stage,
}

impl OidcError {
    pub fn new(code: ErrorCode, description: impl Into<String>, stage: Stage) -> Self {
        Self {
            code,
            description: description.into(),
            stage,
        }
    }

    pub fn fetch(code: ErrorCode, description: impl Into<String>) -> Self {
        Self::new(code, description, Stage::Fetch)
    }

    pub fn validate(code: ErrorCode, description: impl Into<String>) -> Self {
        Self::new(code, description, Stage::Validate)
    }

    pub fn process(code: ErrorCode, description: impl Into<String>) -> Self {
        Self::new(code, description, Stage::Process)
    }

    /// A `server_error` for a contract violation. Logged with full context
    /// at the call site; the description sent to clients stays generic.
    pub fn bug(detail: &str) -> Self {
        log::error!("Internal contract violation: {detail}");
        Self::process(ErrorCode::ServerError, "Internal error")
    }

    /// The JSON body of a direct error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code.as_str(),
            "error_description": self.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_match_registry() {
        assert_eq!(ErrorCode::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(ErrorCode::AuthorizationPending.as_str(), "authorization_pending");
        assert_eq!(ErrorCode::LoginRequired.as_str(), "login_required");
    }

    #[test]
    fn invalid_client_maps_to_401() {
        assert_eq!(ErrorCode::InvalidClient.http_status(), 401);
        assert_eq!(ErrorCode::InvalidGrant.http_status(), 400);
    }
}
