// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # JSON Web Key model
//!
//! [`JsonWebKey`] is polymorphic over `kty`: deserialization selects the
//! variant from the `kty` member, and serialization always emits `kty`
//! first. Each variant carries only the members legal for its key type
//! (RFC 7518 §6); byte-valued members are base64url-encoded without
//! padding.
//!
//! ## Features
//!
//! * `sanitize(include_private)` strips or preserves private components
//! * `has_private_key` / `has_public_key` are computed from member presence
//! * RFC 7638 thumbprints, used as default `kid` values
//! * Conversion to [`VerificationKey`] for signature checks
//!
//! ## Example
//!
//! ```rust
//! use rust_oidc_server::jwt::JsonWebKey;
//!
//! let jwk: JsonWebKey = serde_json::from_str(
//!     r#"{"kty":"oct","k":"c2VjcmV0","kid":"k1"}"#,
//! ).unwrap();
//! assert!(jwk.has_private_key());
//! let public = jwk.sanitize(false);
//! assert!(!public.has_private_key());
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::signing::VerificationKey;

/// RSA key members (RFC 7518 §6.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RsaKeyParameters {
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use, `sig` or `enc`.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,

    /// Algorithm the key is meant for, e.g. `RS256`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Modulus.
    pub n: String,

    /// Public exponent.
    pub e: String,

    /// Private exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    /// First prime factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,

    /// Second prime factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// First factor CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,

    /// Second factor CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,

    /// First CRT coefficient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    /// X.509 certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    /// X.509 certificate SHA-1 thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
}

/// Elliptic curve key members (RFC 7518 §6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EcKeyParameters {
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use, `sig` or `enc`.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,

    /// Algorithm the key is meant for, e.g. `ES256`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Curve name, `P-256` or `P-384`.
    pub crv: String,

    /// X coordinate.
    pub x: String,

    /// Y coordinate.
    pub y: String,

    /// Private scalar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    /// X.509 certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    /// X.509 certificate SHA-1 thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
}

/// Symmetric key members (RFC 7518 §6.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OctKeyParameters {
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use, `sig` or `enc`.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,

    /// Algorithm the key is meant for, e.g. `HS256`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key value.
    pub k: String,
}

/// A JSON Web Key, tagged by `kty`.
///
/// The `kty` member is not stored on the variants; it is derived from the
/// variant itself and serde writes it first during serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum JsonWebKey {
    #[serde(rename = "RSA")]
    Rsa(RsaKeyParameters),
    #[serde(rename = "EC")]
    Ec(EcKeyParameters),
    #[serde(rename = "oct")]
    Oct(OctKeyParameters),
}

impl JsonWebKey {
    /// The `kty` of this key.
    pub fn kty(&self) -> &'static str {
        match self {
            JsonWebKey::Rsa(_) => "RSA",
            JsonWebKey::Ec(_) => "EC",
            JsonWebKey::Oct(_) => "oct",
        }
    }

    /// Key identifier, if set.
    pub fn kid(&self) -> Option<&str> {
        match self {
            JsonWebKey::Rsa(p) => p.kid.as_deref(),
            JsonWebKey::Ec(p) => p.kid.as_deref(),
            JsonWebKey::Oct(p) => p.kid.as_deref(),
        }
    }

    pub fn set_kid(&mut self, kid: impl Into<String>) {
        let kid = Some(kid.into());
        match self {
            JsonWebKey::Rsa(p) => p.kid = kid,
            JsonWebKey::Ec(p) => p.kid = kid,
            JsonWebKey::Oct(p) => p.kid = kid,
        }
    }

    /// Declared algorithm, if set.
    pub fn alg(&self) -> Option<&str> {
        match self {
            JsonWebKey::Rsa(p) => p.alg.as_deref(),
            JsonWebKey::Ec(p) => p.alg.as_deref(),
            JsonWebKey::Oct(p) => p.alg.as_deref(),
        }
    }

    /// Whether private components are present.
    ///
    /// A symmetric key's value is private material; sanitizing strips it.
    pub fn has_private_key(&self) -> bool {
        match self {
            JsonWebKey::Rsa(p) => p.d.is_some(),
            JsonWebKey::Ec(p) => p.d.is_some(),
            JsonWebKey::Oct(p) => !p.k.is_empty(),
        }
    }

    /// Whether public components are present.
    pub fn has_public_key(&self) -> bool {
        match self {
            JsonWebKey::Rsa(p) => !p.n.is_empty() && !p.e.is_empty(),
            JsonWebKey::Ec(p) => !p.x.is_empty() && !p.y.is_empty(),
            JsonWebKey::Oct(_) => false,
        }
    }

    /// Return a copy that either preserves (`include_private = true`) or
    /// strips private components.
    ///
    /// Sanitizing a symmetric key without private components yields a key
    /// with an empty `k`; callers must not publish `oct` keys.
    pub fn sanitize(&self, include_private: bool) -> Self {
        if include_private {
            return self.clone();
        }
        match self {
            JsonWebKey::Rsa(p) => JsonWebKey::Rsa(RsaKeyParameters {
                d: None,
                p: None,
                q: None,
                dp: None,
                dq: None,
                qi: None,
                ..p.clone()
            }),
            JsonWebKey::Ec(p) => JsonWebKey::Ec(EcKeyParameters {
                d: None,
                ..p.clone()
            }),
            JsonWebKey::Oct(p) => JsonWebKey::Oct(OctKeyParameters {
                k: String::new(),
                ..p.clone()
            }),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the canonical JSON containing only
    /// the required members of the key type, keys in lexicographic order.
    ///
    /// `serde_json` maps sort lexicographically, which gives the canonical
    /// member order for free.
    pub fn thumbprint(&self) -> String {
        let canonical = match self {
            JsonWebKey::Rsa(p) => serde_json::json!({
                "e": p.e,
                "kty": "RSA",
                "n": p.n,
            }),
            JsonWebKey::Ec(p) => serde_json::json!({
                "crv": p.crv,
                "kty": "EC",
                "x": p.x,
                "y": p.y,
            }),
            JsonWebKey::Oct(p) => serde_json::json!({
                "k": p.k,
                "kty": "oct",
            }),
        };
        let bytes = serde_json::to_vec(&canonical).expect("canonical JWK serializes");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Build a verification key for signature checks, when the JWK carries
    /// enough public material and a supported algorithm can be determined.
    ///
    /// `fallback_alg` is consulted when the JWK has no `alg` member (the
    /// expected algorithm of the token being validated).
    pub fn verification_key(&self, fallback_alg: Option<&str>) -> Option<VerificationKey> {
        let alg_name = self.alg().or(fallback_alg)?;
        let algorithm: jsonwebtoken::Algorithm = alg_name.parse().ok()?;
        let decoding = match self {
            JsonWebKey::Rsa(p) => {
                jsonwebtoken::DecodingKey::from_rsa_components(&p.n, &p.e).ok()?
            }
            JsonWebKey::Ec(p) => jsonwebtoken::DecodingKey::from_ec_components(&p.x, &p.y).ok()?,
            JsonWebKey::Oct(p) => {
                let secret = URL_SAFE_NO_PAD.decode(&p.k).ok()?;
                jsonwebtoken::DecodingKey::from_secret(&secret)
            }
        };
        Some(VerificationKey {
            kid: self.kid().map(str::to_string),
            algorithm,
            key: decoding,
        })
    }
}

/// JSON Web Key Set (RFC 7517 §5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkKeySet {
    /// The set of JWKs.
    pub keys: Vec<JsonWebKey>,
}

impl JwkKeySet {
    /// Find a key by `kid`.
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    /// Verification keys for every member that can produce one.
    pub fn verification_keys(&self, fallback_alg: Option<&str>) -> Vec<VerificationKey> {
        self.keys
            .iter()
            .filter_map(|k| k.verification_key(fallback_alg))
            .collect()
    }

    /// A copy with every private component stripped, suitable for the
    /// public JWKS endpoint. Symmetric keys are dropped entirely.
    pub fn public_set(&self) -> Self {
        Self {
            keys: self
                .keys
                .iter()
                .filter(|k| !matches!(k, JsonWebKey::Oct(_)))
                .map(|k| k.sanitize(false))
                .collect(),
        }
    }
}

/// Build an RSA public JWK from PEM data (`-----BEGIN RSA PUBLIC KEY-----`
/// or SubjectPublicKeyInfo).
///
/// The `kid` is set to the RFC 7638 thumbprint.
pub fn rsa_public_jwk_from_pem(pem_data: &[u8], alg: &str) -> anyhow::Result<JsonWebKey> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pkcs8::DecodePublicKey;
    use rsa::traits::PublicKeyParts;

    let text = std::str::from_utf8(pem_data)?;
    let public_key = rsa::RsaPublicKey::from_pkcs1_pem(text)
        .or_else(|_| rsa::RsaPublicKey::from_public_key_pem(text))
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA public key from PEM: {e}"))?;

    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    let mut jwk = JsonWebKey::Rsa(RsaKeyParameters {
        public_key_use: Some("sig".to_string()),
        alg: Some(alg.to_string()),
        n,
        e,
        ..Default::default()
    });
    let thumbprint = jwk.thumbprint();
    jwk.set_kid(thumbprint);
    Ok(jwk)
}

/// Build an EC public JWK from a SubjectPublicKeyInfo PEM.
///
/// The uncompressed point (`0x04 ‖ X ‖ Y`) sits at the tail of the SPKI
/// BIT STRING; its length is fixed per curve, which lets us slice it out
/// without a full DER parser.
pub fn ec_public_jwk_from_pem(pem_data: &[u8], alg: &str) -> anyhow::Result<JsonWebKey> {
    let text = std::str::from_utf8(pem_data)?;
    let body: String = text
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    let der = base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|e| anyhow::anyhow!("Failed to decode EC public key PEM: {e}"))?;

    let (crv, coord_len) = match alg {
        "ES256" => ("P-256", 32usize),
        "ES384" => ("P-384", 48usize),
        other => anyhow::bail!("Unsupported EC algorithm {other:?}"),
    };

    let point_len = 1 + 2 * coord_len;
    if der.len() < point_len || der[der.len() - point_len] != 0x04 {
        anyhow::bail!("EC public key is not an uncompressed {crv} point");
    }
    let point = &der[der.len() - point_len..];
    let x = URL_SAFE_NO_PAD.encode(&point[1..1 + coord_len]);
    let y = URL_SAFE_NO_PAD.encode(&point[1 + coord_len..]);

    let mut jwk = JsonWebKey::Ec(EcKeyParameters {
        public_key_use: Some("sig".to_string()),
        alg: Some(alg.to_string()),
        crv: crv.to_string(),
        x,
        y,
        ..Default::default()
    });
    let thumbprint = jwk.thumbprint();
    jwk.set_kid(thumbprint);
    Ok(jwk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rsa() -> JsonWebKey {
        JsonWebKey::Rsa(RsaKeyParameters {
            kid: Some("rsa-1".to_string()),
            n: "sXchTWO0".to_string(),
            e: "AQAB".to_string(),
            d: Some("private".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn kty_is_emitted_first() {
        let json = serde_json::to_string(&sample_rsa()).unwrap();
        assert!(json.starts_with(r#"{"kty":"RSA""#), "{json}");
    }

    #[test]
    fn deserialization_selects_variant_by_kty() {
        let ec: JsonWebKey = serde_json::from_str(
            r#"{"kty":"EC","crv":"P-256","x":"eA","y":"eQ"}"#,
        )
        .unwrap();
        assert!(matches!(ec, JsonWebKey::Ec(_)));
        assert!(ec.has_public_key());
        assert!(!ec.has_private_key());
    }

    #[test]
    fn sanitize_strips_private_components() {
        let sanitized = sample_rsa().sanitize(false);
        assert!(!sanitized.has_private_key());
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("private"));
        // And the round trip preserves the key.
        let back: JsonWebKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sanitized);
    }

    #[test]
    fn roundtrip_preserves_private_key() {
        let original = sample_rsa();
        let json = serde_json::to_string(&original).unwrap();
        let back: JsonWebKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    /// RFC 7638 §3.1 example key and thumbprint.
    #[test]
    fn rfc7638_thumbprint_vector() {
        let jwk = JsonWebKey::Rsa(RsaKeyParameters {
            n: "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".to_string(),
            e: "AQAB".to_string(),
            ..Default::default()
        });
        assert_eq!(jwk.thumbprint(), "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs");
    }
}
