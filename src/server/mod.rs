// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rocket server layer
//!
//! The thin HTTP shell over the protocol engine: request guards that
//! extract client credentials, bearer tokens and the forwarded TLS client
//! certificate; handlers that translate between HTTP and the engine's
//! request/response types; and the builder that assembles the Rocket
//! instance.
//!
//! Everything protocol-relevant lives in [`crate::oidc`]; nothing in this
//! module makes a protocol decision beyond content negotiation.

pub mod builder;
pub mod cors;
pub mod guards;
pub mod handlers;

pub use builder::build_rocket;
