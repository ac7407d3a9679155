// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust OIDC Server Library
//!
//! An OpenID Connect Provider and OAuth 2.0 Authorization Server. The crate
//! is a protocol engine first: every endpoint is a `fetch → validate →
//! process → format` pipeline over explicit stores, with a thin Rocket layer
//! on top.
//!
//! ## Main Components
//!
//! - **Jwt**: key model, signing, verification and JWKS handling
//! - **Store**: TTL-bound stores for codes, tokens, sessions and requests
//! - **Oidc**: the endpoint pipelines (authorization, token, device, CIBA,
//!   introspection, revocation, userinfo, logout, discovery, registration)
//! - **Server**: Rocket mounting, request guards and response formatting
//! - **Utility**: clock, secure random, hashing, SSRF-guarded HTTP fetch
//!
//! ## Usage
//!
//! This library can be used either:
//!
//! 1. As a dependency embedding the engine behind another HTTP host
//! 2. Through the provided `rust_oidc_server` binary
//!
//! ## Binaries
//!
//! - **main**: the authorization server
//! - **rs256keygen**: tool for generating RSA key pairs for token signing

/// Configuration handling for the authorization server.
///
/// Provides functionality for loading, validating, and managing settings
/// including registered clients, signing keys and protocol lifetimes.
pub mod config;

/// Key management service: active signing keys, rotation, published JWKS.
pub mod keys;

/// JWT library: key model, signers/verifiers, claims, JWKS (de)serialization.
pub mod jwt;

/// The protocol engine: endpoint pipelines and their collaborators.
pub mod oidc;

/// Route template resolution for configurable endpoint paths.
pub mod routes;

/// Rocket server layer: guards, forms, handlers and the server builder.
pub mod server;

/// TTL-bound stores and registries backing the protocol state machines.
pub mod store;

/// Utility functions and helper tools.
///
/// Includes the clock abstraction, secure random generation, hashing and
/// the SSRF-protected outbound HTTP client.
pub mod utility;
