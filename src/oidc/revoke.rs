// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # OAuth 2.0 Token Revocation (RFC 7009)
//!
//! Authenticates the client, then flips the token's registry status to
//! `Revoked` until its natural expiry. The endpoint always reports
//! success — also for unknown, expired or foreign tokens — so it leaks
//! nothing about token validity.

use std::collections::HashMap;

use super::client_auth::{authenticate_client, ClientRequest};
use super::error::OidcError;
use super::OidcState;
use crate::jwt::TokenValidator;

/// Handle a revocation request.
pub async fn handle_revocation(
    state: &OidcState,
    credentials: &ClientRequest,
    form: &HashMap<String, String>,
) -> Result<(), OidcError> {
    let authenticated = authenticate_client(state, credentials).await?;

    let Some(token) = form.get("token") else {
        // Nothing to revoke; still a success (RFC 7009 §2.2).
        return Ok(());
    };

    // Signature and issuer must still hold, but expiry must not block
    // revocation: a token past exp is as revoked as it gets.
    let validator = TokenValidator::new(state.clock.clone()).with_issuer(state.issuer());
    let verified =
        match validator.validate_signature_only(token, &state.keys.verification_keys()) {
            Ok(verified) => verified,
            Err(_) => return Ok(()),
        };

    // Only the owning client may revoke a token; others are silently
    // ignored.
    if verified.claims.client_id() == Some(authenticated.client.client_id.as_str()) {
        if let Some(jti) = verified.claims.jti() {
            log::info!(
                "Token {jti:?} revoked by client {:?}",
                authenticated.client.client_id
            );
            state.tokens.revoke(jti).await;
        }
    }

    Ok(())
}
