// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket server builder
//!
//! Assembles the Rocket instance: network configuration from the loaded
//! [`Config`], the engine state, the CORS fairing, and every enabled
//! endpoint mounted under the resolved route base.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use rocket::routes;
use rocket::{Build, Rocket};
use std::sync::Arc;

use super::cors::CORS;
use super::handlers::*;
use crate::config::Config;
use crate::oidc::OidcState;

/// Build a configured Rocket server instance.
///
/// # Parameters
///
/// * `config` - the loaded server configuration
/// * `state` - the shared engine state
///
/// # Returns
///
/// A configured Rocket instance ready to be launched.
pub async fn build_rocket(config: Arc<Config>, state: Arc<OidcState>) -> Rocket<Build> {
    let mut figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()))
        .merge(("ident", config.server.name.clone()));

    if let (Some(cert), Some(key)) = (&config.server.cert, &config.server.key) {
        match (STANDARD.decode(cert), STANDARD.decode(key)) {
            (Ok(cert_pem), Ok(key_pem)) => {
                figment = figment
                    .merge(("tls.certs", cert_pem))
                    .merge(("tls.key", key_pem));
                info!("TLS enabled from configured certificate");
            }
            _ => warn!("TLS certificate or key is not valid Base64; continuing without TLS"),
        }
    }

    let base = state
        .routes
        .path("base")
        .unwrap_or_else(|_| "/connect".to_string());

    // The core protocol surface is always mounted; optional endpoints
    // follow the disabled_endpoints configuration.
    let mut mounted = routes![
        authorize,
        authorize_post,
        token,
        userinfo,
        userinfo_post,
        introspect,
        revoke,
        endsession,
        endsession_post,
        checksession,
    ];
    if !state.is_endpoint_disabled("par") {
        mounted.extend(routes![par]);
    }
    if !state.is_endpoint_disabled("device_authorization") {
        mounted.extend(routes![
            device_authorization,
            device_verify,
            device_approve,
            device_deny,
        ]);
    }
    if !state.is_endpoint_disabled("bc_authorize") {
        mounted.extend(routes![bc_authorize]);
    }
    if !state.is_endpoint_disabled("register") {
        mounted.extend(routes![
            register,
            register_read,
            register_update,
            register_delete,
        ]);
    }

    info!(
        "Mounting {} endpoint routes under {}",
        mounted.len(),
        base
    );

    rocket::custom(figment)
        .manage(state)
        .attach(CORS)
        .mount("/.well-known", routes![openid_configuration, jwks])
        .mount(base, mounted)
}
