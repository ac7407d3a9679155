// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # The protocol engine
//!
//! Each endpoint is a `fetch → validate → process → format` pipeline:
//!
//! 1. **Fetchers** ([`fetch`]) resolve the effective request from inline
//!    parameters, signed request objects, `request_uri` references or
//!    pushed requests.
//! 2. **Validators** ([`validate`]) run in declared order against a
//!    mutable context; the first failure short-circuits.
//! 3. **Processors** (one module per endpoint) perform the side-effecting
//!    work: mint tokens, store codes, update sessions, deliver logout
//!    notifications.
//!
//! Every public operation returns `Result<_, OidcError>`; panics are
//! reserved for programmer bugs.

pub mod authorize;
pub mod ciba;
pub mod client_auth;
pub mod context;
pub mod device;
pub mod discovery;
pub mod endsession;
pub mod error;
pub mod fetch;
pub mod introspect;
pub mod par;
pub mod registration;
pub mod revoke;
pub mod scopes;
pub mod session;
pub mod token;
pub mod userinfo;
pub mod validate;

mod state;

pub use context::{AuthSession, AuthorizationContext, CodeChallengeMethod};
pub use error::{ErrorCode, OidcError, Stage};
pub use state::OidcState;
