// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Authorization request validation
//!
//! A validator is a small function over the mutable [`ValidationContext`];
//! the pipeline runs them in declared order and the first error aborts.
//! The order matters: nothing downstream may assume a field an earlier
//! validator has not established (the client is resolved first, the
//! redirect URI second, and only then is it legal to report errors via
//! redirect).

use std::collections::HashMap;

use super::context::{AuthSession, CodeChallengeMethod};
use super::error::{ErrorCode, OidcError};
use super::OidcState;
use crate::store::ClientInfo;

/// Mutable state threaded through the pipeline.
pub struct ValidationContext<'a> {
    pub state: &'a OidcState,
    pub params: &'a HashMap<String, String>,
    pub session: Option<&'a AuthSession>,

    /// Resolved once the client validator ran.
    pub client: Option<ClientInfo>,

    /// Scopes granted so far.
    pub scopes: Vec<String>,

    /// Resource URIs granted so far.
    pub resources: Vec<String>,
}

impl<'a> ValidationContext<'a> {
    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    fn client(&self) -> &ClientInfo {
        self.client.as_ref().expect("client validator ran first")
    }
}

/// The outcome of a validated authorization request.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorizationRequest {
    pub client: ClientInfo,
    pub response_type: String,
    pub response_mode: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub resources: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub prompt: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub claims: Option<serde_json::Value>,
}

type Validator = fn(&mut ValidationContext) -> Option<OidcError>;

/// Pipeline order for the authorization endpoint.
const PIPELINE: &[(&str, Validator)] = &[
    ("client", validate_client),
    ("redirect_uri", validate_redirect_uri),
    ("response_type", validate_response_type),
    ("resource", validate_resources),
    ("scope", validate_scopes),
    ("nonce", validate_nonce),
    ("pkce", validate_pkce),
    ("prompt", validate_prompt),
];

/// Run the full pipeline over an assembled parameter map.
pub fn validate_authorization_request(
    state: &OidcState,
    params: &HashMap<String, String>,
    session: Option<&AuthSession>,
) -> Result<ValidatedAuthorizationRequest, OidcError> {
    let mut ctx = ValidationContext {
        state,
        params,
        session,
        client: None,
        scopes: Vec::new(),
        resources: Vec::new(),
    };

    for (name, validator) in PIPELINE {
        if let Some(error) = validator(&mut ctx) {
            log::debug!("Authorization request failed {name} validation: {error}");
            return Err(error);
        }
    }

    let method = ctx
        .param("code_challenge_method")
        .and_then(CodeChallengeMethod::parse)
        .or_else(|| ctx.param("code_challenge").map(|_| CodeChallengeMethod::Plain));

    Ok(ValidatedAuthorizationRequest {
        client: ctx.client.clone().expect("pipeline resolves the client"),
        response_type: ctx.param("response_type").unwrap_or_default().to_string(),
        response_mode: ctx.param("response_mode").map(str::to_string),
        redirect_uri: ctx.param("redirect_uri").unwrap_or_default().to_string(),
        state: ctx.param("state").map(str::to_string),
        nonce: ctx.param("nonce").map(str::to_string),
        prompt: ctx.param("prompt").map(str::to_string),
        code_challenge: ctx.param("code_challenge").map(str::to_string),
        code_challenge_method: ctx.param("code_challenge").and(method),
        claims: ctx
            .param("claims")
            .and_then(|raw| serde_json::from_str(raw).ok()),
        scopes: ctx.scopes,
        resources: ctx.resources,
    })
}

/// 1. `client_id` present and known.
fn validate_client(ctx: &mut ValidationContext) -> Option<OidcError> {
    let client_id = match ctx.param("client_id") {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Some(OidcError::validate(
                ErrorCode::InvalidRequest,
                "client_id is required",
            ))
        }
    };
    match ctx.state.clients.get(client_id) {
        Some(client) => {
            ctx.client = Some(client);
            None
        }
        None => Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "Unknown client_id",
        )),
    }
}

/// 2. `redirect_uri` present, absolute, fragment-free, allowlisted.
fn validate_redirect_uri(ctx: &mut ValidationContext) -> Option<OidcError> {
    let uri = match ctx.param("redirect_uri") {
        Some(uri) => uri,
        None => {
            return Some(OidcError::validate(
                ErrorCode::InvalidRequest,
                "redirect_uri is required",
            ))
        }
    };
    let parsed = match url::Url::parse(uri) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Some(OidcError::validate(
                ErrorCode::InvalidRequest,
                "redirect_uri must be absolute",
            ))
        }
    };
    if parsed.fragment().is_some() {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "redirect_uri must not carry a fragment",
        ));
    }
    if !ctx.client().allows_redirect_uri(uri) {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "redirect_uri is not registered for this client",
        ));
    }
    None
}

/// 3. `response_type` in the client's allowed set.
fn validate_response_type(ctx: &mut ValidationContext) -> Option<OidcError> {
    let response_type = match ctx.param("response_type") {
        Some(rt) if !rt.is_empty() => rt,
        _ => {
            return Some(OidcError::validate(
                ErrorCode::InvalidRequest,
                "response_type is required",
            ))
        }
    };
    for token in response_type.split_whitespace() {
        if !matches!(token, "code" | "id_token" | "token") {
            return Some(OidcError::validate(
                ErrorCode::UnsupportedResponseType,
                format!("Unknown response_type component {token:?}"),
            ));
        }
    }
    if !ctx.client().allows_response_type(response_type) {
        return Some(OidcError::validate(
            ErrorCode::UnsupportedResponseType,
            "response_type is not allowed for this client",
        ));
    }
    None
}

/// 4. Each `resource` is absolute, fragment-free and registered.
fn validate_resources(ctx: &mut ValidationContext) -> Option<OidcError> {
    let requested: Vec<String> = ctx
        .param("resource")
        .map(|r| r.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if requested.is_empty() {
        return None;
    }
    match ctx.state.resources.resolve(&requested) {
        Ok(resolved) => {
            ctx.resources = resolved.into_iter().map(|r| r.uri).collect();
            None
        }
        Err(error) => Some(error),
    }
}

/// 5. Every scope token is known, offered by a requested resource, and
/// allowed for the client; `offline_access` needs explicit permission and
/// an interactive flow.
fn validate_scopes(ctx: &mut ValidationContext) -> Option<OidcError> {
    let requested: Vec<String> = ctx
        .param("scope")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let interactive = ctx
        .param("response_type")
        .map(|rt| rt.split_whitespace().any(|t| t == "code"))
        .unwrap_or(false);

    let mut granted = Vec::new();
    for scope in requested {
        let offered_by_resource = ctx.resources.iter().any(|uri| {
            ctx.state
                .resources
                .get(uri)
                .map(|r| r.scopes.iter().any(|s| s == &scope))
                .unwrap_or(false)
        });
        if !ctx.state.scopes.is_known(&scope) && !offered_by_resource {
            return Some(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not recognized"),
            ));
        }
        if !ctx.client().allows_scope(&scope) {
            return Some(OidcError::validate(
                ErrorCode::InvalidScope,
                format!("Scope {scope:?} is not allowed for this client"),
            ));
        }
        if scope == "offline_access" {
            if !ctx.client().allow_offline_access {
                return Some(OidcError::validate(
                    ErrorCode::InvalidScope,
                    "Client may not request offline_access",
                ));
            }
            if !interactive {
                // OIDC Core §11: ignore rather than fail.
                continue;
            }
        }
        granted.push(scope);
    }
    ctx.scopes = granted;
    None
}

/// 6. `nonce` required when an ID token comes back from the front channel.
fn validate_nonce(ctx: &mut ValidationContext) -> Option<OidcError> {
    let implicit_id_token = ctx
        .param("response_type")
        .map(|rt| rt.split_whitespace().any(|t| t == "id_token"))
        .unwrap_or(false);
    if implicit_id_token && ctx.param("nonce").is_none() {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "nonce is required when response_type includes id_token",
        ));
    }
    None
}

/// 7. PKCE parameter conformance.
fn validate_pkce(ctx: &mut ValidationContext) -> Option<OidcError> {
    let code_flow = ctx
        .param("response_type")
        .map(|rt| rt.split_whitespace().any(|t| t == "code"))
        .unwrap_or(false);
    let challenge = ctx.param("code_challenge");

    if !code_flow {
        return None;
    }

    let Some(challenge) = challenge else {
        if ctx.client().require_pkce {
            return Some(OidcError::validate(
                ErrorCode::InvalidRequest,
                "code_challenge is required for this client",
            ));
        }
        return None;
    };

    let method = match ctx.param("code_challenge_method") {
        None => CodeChallengeMethod::Plain,
        Some(raw) => match CodeChallengeMethod::parse(raw) {
            Some(method) => method,
            None => {
                return Some(OidcError::validate(
                    ErrorCode::InvalidRequest,
                    "code_challenge_method must be S256 or plain",
                ))
            }
        },
    };

    if method == CodeChallengeMethod::Plain && !ctx.client().allow_plain_pkce {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "The plain code_challenge_method is not allowed for this client",
        ));
    }

    // RFC 7636 §4.2: 43..=128 characters of the unreserved alphabet.
    let valid_chars = challenge
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
    if challenge.len() < 43 || challenge.len() > 128 || !valid_chars {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "code_challenge is not well formed",
        ));
    }
    None
}

/// 8. `prompt` conformance against the current session.
fn validate_prompt(ctx: &mut ValidationContext) -> Option<OidcError> {
    let Some(prompt) = ctx.param("prompt") else {
        return None;
    };
    let values: Vec<&str> = prompt.split_whitespace().collect();

    if values.contains(&"none") && values.len() > 1 {
        return Some(OidcError::validate(
            ErrorCode::InvalidRequest,
            "prompt=none cannot be combined with other values",
        ));
    }
    if values.contains(&"none") && ctx.session.is_none() {
        return Some(OidcError::validate(
            ErrorCode::LoginRequired,
            "prompt=none with no authenticated user",
        ));
    }
    None
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
    - client_id: "web-app"
      redirect_uris: ["https://app.example.com/cb"]
      response_types: ["code", "code id_token"]
      grant_types: ["authorization_code"]
      scopes: ["openid", "profile", "offline_access"]
      allow_offline_access: true
      token_endpoint_auth_method: "none"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        OidcState::from_config(Arc::new(config)).unwrap()
    }

    fn base_params() -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("client_id".to_string(), "web-app".to_string());
        params.insert(
            "redirect_uri".to_string(),
            "https://app.example.com/cb".to_string(),
        );
        params.insert("response_type".to_string(), "code".to_string());
        params.insert("scope".to_string(), "openid".to_string());
        params.insert(
            "code_challenge".to_string(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
        );
        params.insert("code_challenge_method".to_string(), "S256".to_string());
        params
    }

    #[test]
    fn valid_request_passes() {
        let state = state();
        let request =
            validate_authorization_request(&state, &base_params(), None).unwrap();
        assert_eq!(request.client.client_id, "web-app");
        assert_eq!(request.scopes, vec!["openid"]);
        assert_eq!(request.code_challenge_method, Some(CodeChallengeMethod::S256));
    }

    #[test]
    fn unknown_client_aborts_first() {
        let state = state();
        let mut params = base_params();
        params.insert("client_id".to_string(), "nope".to_string());
        let err = validate_authorization_request(&state, &params, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn unregistered_redirect_uri_is_rejected() {
        let state = state();
        let mut params = base_params();
        params.insert(
            "redirect_uri".to_string(),
            "https://evil.example.com/cb".to_string(),
        );
        assert!(validate_authorization_request(&state, &params, None).is_err());
    }

    #[test]
    fn plain_pkce_is_rejected_by_default_policy() {
        let state = state();
        let mut params = base_params();
        params.remove("code_challenge_method");
        params.insert(
            "code_challenge".to_string(),
            "plain-verifier-value-plain-verifier-value-123".to_string(),
        );
        let err = validate_authorization_request(&state, &params, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(err.description.contains("plain"));
    }

    #[test]
    fn prompt_none_without_session_is_login_required() {
        let state = state();
        let mut params = base_params();
        params.insert("prompt".to_string(), "none".to_string());
        let err = validate_authorization_request(&state, &params, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::LoginRequired);
    }

    #[test]
    fn missing_nonce_with_id_token_fails() {
        let state = state();
        let mut params = base_params();
        params.insert("response_type".to_string(), "code id_token".to_string());
        let err = validate_authorization_request(&state, &params, None).unwrap_err();
        assert!(err.description.contains("nonce"));
    }
}
