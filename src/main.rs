// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the OpenID Connect provider

use anyhow::{Context as _, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use rust_oidc_server::config::Config;
use rust_oidc_server::oidc::OidcState;
use rust_oidc_server::server::build_rocket;

/// OpenID Connect Provider and OAuth 2.0 Authorization Server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured bind address
    #[arg(long)]
    address: Option<String>,
}

#[rocket::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        info!(
            "Configuration file {} not found; starting with defaults",
            args.config.display()
        );
        Config::default()
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let config = Arc::new(config);
    let state = Arc::new(
        OidcState::from_config(config.clone()).context("Failed to initialize the engine")?,
    );

    info!(
        "Starting {} as issuer {}",
        config.server.name, config.server.issuer
    );
    build_rocket(config, state)
        .await
        .launch()
        .await
        .context("Server terminated abnormally")?;
    Ok(())
}
