// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # SSRF-protected outbound HTTP
//!
//! Every URL the server dereferences on behalf of a client — `request_uri`
//! documents, client JWKS, sector identifiers, back-channel logout targets —
//! goes through [`OutboundFetcher`]. The fetcher:
//!
//! * accepts `https` only (plain `http` to loopback can be enabled for
//!   tests),
//! * resolves DNS first and rejects any answer in a private, loopback,
//!   link-local, unique-local or multicast range,
//! * dials the resolved addresses directly instead of re-resolving at
//!   connect time, closing the DNS TOCTOU window,
//! * refuses redirects,
//! * enforces a total timeout and a maximum response size.
//!
//! ## References
//!
//! * [RFC 9101 §10.4 (request_uri SSRF considerations)](https://datatracker.ietf.org/doc/html/rfc9101#section-10.4)

use log::debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors surfaced by the outbound fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL {0:?} is not valid")]
    InvalidUrl(String),

    #[error("Scheme {0:?} is not allowed for outbound fetches")]
    ForbiddenScheme(String),

    #[error("Host {host:?} resolves to the non-routable address {addr}")]
    ForbiddenAddress { host: String, addr: IpAddr },

    #[error("Host {0:?} did not resolve to any address")]
    EmptyResolution(String),

    #[error("Response exceeds the {0} byte limit")]
    ResponseTooLarge(usize),

    #[error("Response from {0:?} is not the expected document format")]
    MalformedBody(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("DNS resolution failed: {0}")]
    Resolution(#[from] std::io::Error),
}

/// Limits applied to a fetch.
#[derive(Debug, Clone)]
pub struct SsrfPolicy {
    /// Maximum accepted response body size in bytes.
    pub max_response_bytes: usize,

    /// Overall fetch timeout.
    pub timeout: Duration,

    /// Accept plain-http URLs to loopback addresses. Tests only.
    pub allow_insecure_loopback: bool,
}

impl Default for SsrfPolicy {
    fn default() -> Self {
        Self {
            max_response_bytes: 256 * 1024,
            timeout: Duration::from_secs(10),
            allow_insecure_loopback: false,
        }
    }
}

/// Outbound HTTP client with SSRF protection.
#[derive(Debug, Clone)]
pub struct OutboundFetcher {
    policy: SsrfPolicy,
}

impl OutboundFetcher {
    pub fn new(policy: SsrfPolicy) -> Self {
        Self { policy }
    }

    /// GET `url` and return the body as bytes.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (parsed, addrs) = self.resolve_checked(url).await?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let client = reqwest::Client::builder()
            .timeout(self.policy.timeout)
            .redirect(reqwest::redirect::Policy::none())
            // Dial the addresses we vetted; never re-resolve at connect time.
            .resolve_to_addrs(&host, &addrs)
            .build()?;

        debug!("Outbound fetch {} via {:?}", parsed, addrs);
        let response = client.get(parsed.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.policy.max_response_bytes {
                return Err(FetchError::ResponseTooLarge(self.policy.max_response_bytes));
            }
        }

        let mut body = Vec::new();
        let mut response = response;
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.policy.max_response_bytes {
                return Err(FetchError::ResponseTooLarge(self.policy.max_response_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// GET `url` and parse the body as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body).map_err(|_| FetchError::MalformedBody(url.to_string()))
    }

    /// POST `form` to `url`, used by back-channel logout delivery. The same
    /// scheme/address checks apply; the response body is discarded.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<u16, FetchError> {
        let (parsed, addrs) = self.resolve_checked(url).await?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let client = reqwest::Client::builder()
            .timeout(self.policy.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .resolve_to_addrs(&host, &addrs)
            .build()?;

        let response = client.post(parsed.as_str()).form(form).send().await?;
        Ok(response.status().as_u16())
    }

    /// Parse the URL, enforce the scheme rules, resolve the host and verify
    /// every resolved address is publicly routable.
    async fn resolve_checked(&self, url: &str) -> Result<(Url, Vec<SocketAddr>), FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        match parsed.scheme() {
            "https" => {}
            "http" if self.policy.allow_insecure_loopback => {}
            other => return Err(FetchError::ForbiddenScheme(other.to_string())),
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?
            .to_string();
        let port = parsed.port_or_known_default().unwrap_or(443);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await?
            .collect();
        if addrs.is_empty() {
            return Err(FetchError::EmptyResolution(host));
        }

        for addr in &addrs {
            let ip = addr.ip();
            let loopback_ok = self.policy.allow_insecure_loopback && ip.is_loopback();
            if !loopback_ok && is_non_routable(ip) {
                return Err(FetchError::ForbiddenAddress { host, addr: ip });
            }
        }
        Ok((parsed, addrs))
    }
}

/// Whether `ip` lies in a range the server must never fetch from.
fn is_non_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // Carrier-grade NAT, 100.64.0.0/10.
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_non_routable(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                // Unique local, fc00::/7.
                || (segments[0] & 0xfe00) == 0xfc00
                // Link local, fe80::/10.
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_private_ranges() {
        for ip in [
            "10.0.0.1",
            "172.16.5.5",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
        ] {
            assert!(is_non_routable(ip.parse().unwrap()), "{ip}");
        }
        for ip in ["fc00::1", "fe80::1", "::1", "::ffff:10.0.0.1"] {
            assert!(is_non_routable(ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn accepts_public_addresses() {
        for ip in ["93.184.216.34", "2606:2800:220:1:248:1893:25c8:1946"] {
            assert!(!is_non_routable(ip.parse().unwrap()), "{ip}");
        }
    }

    #[tokio::test]
    async fn refuses_http_scheme_by_default() {
        let fetcher = OutboundFetcher::new(SsrfPolicy::default());
        let err = fetcher.fetch("http://example.com/jwks").await.unwrap_err();
        assert!(matches!(err, FetchError::ForbiddenScheme(_)));
    }
}
