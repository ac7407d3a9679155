// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Device authorization (RFC 8628)
//!
//! The initiation endpoint mints a `device_code` / `user_code` pair; the
//! verification service resolves user-entered codes for the consent UI.
//!
//! The verification service is hardened against brute force and
//! enumeration: attempts are rate limited per code and per caller IP, and
//! every attempt is recorded whether or not the code exists, so the error
//! a caller sees never reveals which failure occurred.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client_auth::{authenticate_client, ClientRequest};
use super::context::AuthorizationContext;
use super::error::{ErrorCode, OidcError};
use super::token::GRANT_DEVICE_CODE;
use super::OidcState;
use crate::store::{DeviceAuthorizationRequest, DeviceStatus, TtlStore};
use crate::utility::random::{opaque_token, user_code};

/// Response of the initiation endpoint (RFC 8628 §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,

    pub expires_in: i64,
    pub interval: i64,
}

/// Handle a device authorization request.
pub async fn handle_device_authorization(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<DeviceAuthorizationResponse, OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;
    if !authenticated.client.allows_grant_type(GRANT_DEVICE_CODE) {
        return Err(OidcError::validate(
            ErrorCode::UnauthorizedClient,
            "Client is not authorized for the device grant",
        ));
    }

    let mut scopes = Vec::new();
    for scope in form
        .get("scope")
        .map(|s| s.split_whitespace())
        .into_iter()
        .flatten()
    {
        if !state.scopes.is_known(scope) {
            return Err(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not recognized"),
            ));
        }
        if !authenticated.client.allows_scope(scope) {
            return Err(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not allowed for this client"),
            ));
        }
        scopes.push(scope.to_string());
    }

    let requested_resources: Vec<String> = form
        .get("resource")
        .map(|r| r.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let resources = state
        .resources
        .resolve(&requested_resources)?
        .into_iter()
        .map(|r| r.uri)
        .collect();

    let lifetimes = &state.config.lifetimes;
    let device_code = opaque_token(32);
    let code = user_code(&lifetimes.user_code_alphabet, 2, 4);

    let request = DeviceAuthorizationRequest {
        device_code: device_code.clone(),
        user_code: code.clone(),
        client_id: authenticated.client.client_id.clone(),
        scopes,
        resources,
        status: DeviceStatus::Pending,
        next_poll_at: state.clock.now(),
        grant: None,
    };
    state.devices.insert(request, lifetimes.device_code_ttl).await;

    let verification_uri = state
        .endpoint_url("device_verification")
        .unwrap_or_else(|| format!("{}/device", state.issuer().trim_end_matches('/')));

    log::info!(
        "Device authorization started for client {:?}",
        authenticated.client.client_id
    );
    Ok(DeviceAuthorizationResponse {
        device_code,
        verification_uri_complete: Some(format!("{verification_uri}?user_code={code}")),
        verification_uri,
        user_code: code,
        expires_in: lifetimes.device_code_ttl,
        interval: lifetimes.poll_interval,
    })
}

/// Resolve a user-entered code for the consent UI.
///
/// Every call is recorded against both rate-limit windows before the code
/// is even looked up; over-limit callers and callers presenting unknown,
/// expired or already-decided codes all receive the same generic error.
pub async fn verify_user_code(
    state: &OidcState,
    entered_code: &str,
    client_ip: &str,
) -> Result<DeviceAuthorizationRequest, OidcError> {
    let lifetimes = &state.config.lifetimes;
    let normalized = entered_code.trim().to_uppercase();

    let per_code = bump_attempts(state, &format!("uc:{normalized}")).await;
    let per_ip = bump_attempts(state, &format!("ip:{client_ip}")).await;

    let generic = || {
        OidcError::process(
            ErrorCode::AccessDenied,
            "The code is not valid",
        )
    };

    if per_code > lifetimes.user_code_max_attempts
        || per_ip > lifetimes.user_code_max_attempts.saturating_mul(4)
    {
        log::warn!("User-code verification rate limit hit from {client_ip}");
        return Err(generic());
    }

    match state.devices.find_by_user_code(&normalized).await {
        Some(request) if request.status == DeviceStatus::Pending => Ok(request),
        _ => Err(generic()),
    }
}

/// Record the user's consent decision.
pub async fn approve_user_code(
    state: &OidcState,
    entered_code: &str,
    grant: AuthorizationContext,
) -> Result<(), OidcError> {
    let normalized = entered_code.trim().to_uppercase();
    if state.devices.approve(&normalized, grant).await {
        Ok(())
    } else {
        Err(OidcError::process(
            ErrorCode::AccessDenied,
            "The code is not valid",
        ))
    }
}

/// Record the user's denial.
pub async fn deny_user_code(state: &OidcState, entered_code: &str) -> Result<(), OidcError> {
    let normalized = entered_code.trim().to_uppercase();
    if state.devices.deny(&normalized).await {
        Ok(())
    } else {
        Err(OidcError::process(
            ErrorCode::AccessDenied,
            "The code is not valid",
        ))
    }
}

/// Fixed-window attempt counter. The first attempt opens the window; the
/// count resets when it expires.
async fn bump_attempts(state: &OidcState, key: &str) -> u32 {
    let window = state.config.lifetimes.user_code_attempt_window;
    match state.user_code_attempts.get(key).await {
        Some(count) => {
            state.user_code_attempts.update(key, count + 1).await;
            count + 1
        }
        None => {
            state.user_code_attempts.put(key, 1, window).await;
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn state() -> OidcState {
        let yaml = r#"
access:
  clients:
    - client_id: "tv-app"
      grant_types: ["urn:ietf:params:oauth:grant-type:device_code"]
      scopes: ["openid"]
      token_endpoint_auth_method: "none"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        OidcState::from_config(Arc::new(config)).unwrap()
    }

    fn device_request() -> (OidcState, ClientRequest, HashMap<String, String>) {
        let state = state();
        let credentials = ClientRequest {
            client_id: Some("tv-app".to_string()),
            ..Default::default()
        };
        let mut form = HashMap::new();
        form.insert("scope".to_string(), "openid".to_string());
        (state, credentials, form)
    }

    #[tokio::test]
    async fn initiation_returns_codes_and_interval() {
        let (state, credentials, form) = device_request();
        let response = handle_device_authorization(&state, &credentials, &form)
            .await
            .unwrap();

        assert_eq!(response.interval, 5);
        assert_eq!(response.expires_in, 300);
        assert_eq!(response.user_code.len(), 9);
        assert!(response
            .verification_uri_complete
            .as_ref()
            .unwrap()
            .contains(&response.user_code));
    }

    #[tokio::test]
    async fn unknown_codes_and_rate_limits_are_indistinguishable() {
        let (state, credentials, form) = device_request();
        handle_device_authorization(&state, &credentials, &form)
            .await
            .unwrap();

        let unknown = verify_user_code(&state, "XXXX-XXXX", "203.0.113.9")
            .await
            .unwrap_err();

        // Burn through the per-code budget of a real code.
        let real = state
            .devices
            .find_by_user_code(
                &handle_device_authorization(&state, &credentials, &form)
                    .await
                    .unwrap()
                    .user_code,
            )
            .await
            .unwrap();
        let mut limited = None;
        for _ in 0..10 {
            limited = Some(verify_user_code(&state, &real.user_code, "203.0.113.9").await);
        }
        let limited = limited.unwrap().unwrap_err();

        assert_eq!(unknown.code, limited.code);
        assert_eq!(unknown.description, limited.description);
    }
}
