// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # RS256 Key Generator
//!
//! Generates an RSA signing key pair for the server and emits the
//! `security.keys` configuration entry the loader expects: the loader
//! (`config/security.rs`) takes both keys as Base64-encoded PEM documents,
//! so the tool prints a ready-to-paste YAML snippet alongside the PEM
//! files.
//!
//! ## Usage
//!
//! ```text
//! rs256keygen --length 3072 --out-private-key keys/private.pem --out-pub-key keys/public.pem
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Generate an RSA key pair for the `security.keys` configuration.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Generate an RSA signing key pair for token signing")]
struct Args {
    /// Output path for the public key, PKCS#1 PEM.
    #[clap(long, default_value = "./pub.key")]
    out_pub_key: PathBuf,

    /// Output path for the private key, PKCS#1 PEM.
    #[clap(long, default_value = "./private.key")]
    out_private_key: PathBuf,

    /// RSA modulus size in bits. 2048 is the floor; 4096 trades slower
    /// signing for a larger margin.
    #[clap(long, default_value = "4096")]
    length: usize,

    /// Skip printing the ready-to-paste `security.keys` YAML snippet.
    #[clap(long)]
    no_config_snippet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!(
        "Generating a {}-bit RSA key pair (this can take a while)...",
        args.length
    );
    let private_key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, args.length)
        .context("RSA key generation failed")?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("Failed to encode the private key as PEM")?;
    let public_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("Failed to encode the public key as PEM")?;

    std::fs::write(&args.out_private_key, private_pem.as_bytes()).with_context(|| {
        format!("Failed to write {}", args.out_private_key.display())
    })?;
    std::fs::write(&args.out_pub_key, public_pem.as_bytes())
        .with_context(|| format!("Failed to write {}", args.out_pub_key.display()))?;

    eprintln!("Private key written to {}", args.out_private_key.display());
    eprintln!("Public key written to {}", args.out_pub_key.display());

    if !args.no_config_snippet {
        // The config loader takes Base64-encoded PEM, so the snippet can
        // be pasted into config.yaml as is.
        println!("security:");
        println!("  keys:");
        println!("    - algorithm: RS256");
        println!("      private_key: {}", STANDARD.encode(private_pem.as_bytes()));
        println!("      public_key: {}", STANDARD.encode(public_pem.as_bytes()));
    }

    Ok(())
}
