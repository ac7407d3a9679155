// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Key management service
//!
//! Owns the signing keys of the issuer. The signer asks for the active key
//! per algorithm; verifiers accept any published key matching `kid`; the
//! JWKS endpoint publishes the sanitized public parameters of every
//! asymmetric key.
//!
//! The key ring is an immutable snapshot behind a read-write lock; rotation
//! swaps the snapshot so in-flight requests keep the ring they started
//! with.

use anyhow::{bail, Context as _, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::SecurityConfig;
use crate::jwt::{JwkKeySet, SigningKey, VerificationKey};

struct KeyRing {
    keys: Vec<Arc<SigningKey>>,
    /// Index of the active signer per algorithm name.
    active: HashMap<String, usize>,
}

/// Process-wide key management service.
pub struct KeyManager {
    ring: RwLock<Arc<KeyRing>>,
}

impl KeyManager {
    /// Build the manager from configuration.
    ///
    /// When no key is configured a 2048-bit RSA development key is
    /// generated at startup; production deployments must configure stable
    /// keys or tokens stop verifying across restarts.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let mut keys = Vec::new();
        let mut active = HashMap::new();

        for entry in &config.keys {
            let key = build_key(entry).with_context(|| {
                format!("Failed to load signing key {:?}", entry.kid.as_deref().unwrap_or("<thumbprint>"))
            })?;
            let key = match &entry.kid {
                Some(kid) => key.with_kid(kid.clone()),
                None => key,
            };
            if entry.active {
                active
                    .entry(key.algorithm_name())
                    .or_insert(keys.len());
            }
            keys.push(Arc::new(key));
        }

        if keys.is_empty() {
            warn!("No signing keys configured; generating an ephemeral RSA development key");
            let key = Arc::new(generate_dev_key()?);
            active.insert(key.algorithm_name(), 0);
            keys.push(key);
        }

        if active.is_empty() {
            bail!("At least one signing key must be active");
        }

        Ok(Self {
            ring: RwLock::new(Arc::new(KeyRing { keys, active })),
        })
    }

    /// The default signing key (active key of the first configured
    /// algorithm, RS256 preferred).
    pub fn default_signing_key(&self) -> Arc<SigningKey> {
        let ring = self.ring.read().unwrap().clone();
        if let Some(&idx) = ring.active.get("RS256") {
            return ring.keys[idx].clone();
        }
        let &idx = ring.active.values().next().expect("ring has an active key");
        ring.keys[idx].clone()
    }

    /// The active signing key for `algorithm`, if one is configured.
    pub fn signing_key_for(&self, algorithm: &str) -> Option<Arc<SigningKey>> {
        let ring = self.ring.read().unwrap().clone();
        ring.active.get(algorithm).map(|&idx| ring.keys[idx].clone())
    }

    /// Every key accepted for verifying server-issued tokens.
    pub fn verification_keys(&self) -> Vec<VerificationKey> {
        let ring = self.ring.read().unwrap().clone();
        ring.keys
            .iter()
            .flat_map(|k| k.verification_keys())
            .collect()
    }

    /// The published JWKS: sanitized public parameters of every asymmetric
    /// key. Symmetric keys are never published.
    pub fn public_jwks(&self) -> JwkKeySet {
        let ring = self.ring.read().unwrap().clone();
        JwkKeySet {
            keys: ring
                .keys
                .iter()
                .filter_map(|k| k.public_jwk.clone())
                .map(|jwk| jwk.sanitize(false))
                .collect(),
        }
    }

    /// Rotate in a new key: it becomes the active signer for its algorithm
    /// while previous keys stay published for verification.
    pub fn rotate(&self, key: SigningKey) {
        let mut guard = self.ring.write().unwrap();
        let old = guard.clone();
        let mut keys = old.keys.clone();
        let mut active = old.active.clone();
        info!("Rotating in signing key {} ({})", key.kid, key.algorithm_name());
        active.insert(key.algorithm_name(), keys.len());
        keys.push(Arc::new(key));
        *guard = Arc::new(KeyRing { keys, active });
    }
}

fn build_key(entry: &crate::config::SigningKeyEntry) -> Result<SigningKey> {
    let alg = entry.algorithm.as_str();
    if alg.starts_with("HS") {
        let secret = STANDARD
            .decode(&entry.private_key)
            .context("HMAC secret must be Base64")?;
        return SigningKey::new_symmetric(&secret, alg);
    }

    let private_pem = STANDARD
        .decode(&entry.private_key)
        .context("private_key must be a Base64-encoded PEM document")?;
    let public_pem = STANDARD
        .decode(&entry.public_key)
        .context("public_key must be a Base64-encoded PEM document")?;

    if alg.starts_with("RS") || alg.starts_with("PS") {
        SigningKey::new_rsa_from_pem(&private_pem, &public_pem, alg)
    } else if alg.starts_with("ES") {
        SigningKey::new_ec_from_pem(&private_pem, &public_pem, alg)
    } else {
        bail!("Unsupported signing algorithm {alg:?}")
    }
}

/// Generate an in-memory RSA key pair for development use.
pub fn generate_dev_key() -> Result<SigningKey> {
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};

    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        rsa::RsaPrivateKey::new(&mut rng, 2048).context("Failed to generate RSA key")?;
    let public_key = rsa::RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .context("Failed to encode private key")?;
    let public_pem = public_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .context("Failed to encode public key")?;

    SigningKey::new_rsa_from_pem(private_pem.as_bytes(), public_pem.as_bytes(), "RS256")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_generates_dev_key() {
        let manager = KeyManager::from_config(&SecurityConfig::default()).unwrap();
        let key = manager.default_signing_key();
        assert_eq!(key.algorithm_name(), "RS256");
        assert_eq!(manager.public_jwks().keys.len(), 1);
    }

    #[test]
    fn rotation_keeps_old_keys_published() {
        let manager = KeyManager::from_config(&SecurityConfig::default()).unwrap();
        let old_kid = manager.default_signing_key().kid.clone();

        manager.rotate(generate_dev_key().unwrap());
        let new_kid = manager.default_signing_key().kid.clone();

        assert_ne!(old_kid, new_kid);
        let published: Vec<String> = manager
            .public_jwks()
            .keys
            .iter()
            .filter_map(|k| k.kid().map(str::to_string))
            .collect();
        assert!(published.contains(&old_kid));
        assert!(published.contains(&new_kid));
    }

    #[test]
    fn public_jwks_carries_no_private_material() {
        let manager = KeyManager::from_config(&SecurityConfig::default()).unwrap();
        for key in &manager.public_jwks().keys {
            assert!(!key.has_private_key());
        }
    }
}
