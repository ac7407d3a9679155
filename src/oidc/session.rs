// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Session state (OIDC Session Management)
//!
//! RPs poll the OP through a hidden iframe: the `session_state` value
//! handed out with every authorization response hashes the client, the RP
//! origin and the OP browser state, so the iframe can detect a changed
//! session without any network traffic.
//!
//! `session_state = base64url(sha256(client_id || " " || origin || " " ||
//! opbs || " " || salt)) || "." || salt`

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::utility::random::opaque_token;

/// Compute a `session_state` with a fresh salt.
pub fn session_state_value(client_id: &str, origin: &str, opbs: &str) -> String {
    compute_session_state(client_id, origin, opbs, &opaque_token(8))
}

/// The deterministic part, exposed for the iframe script and for tests.
pub fn compute_session_state(client_id: &str, origin: &str, opbs: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(b" ");
    hasher.update(origin.as_bytes());
    hasher.update(b" ");
    hasher.update(opbs.as_bytes());
    hasher.update(b" ");
    hasher.update(salt.as_bytes());
    format!("{}.{salt}", URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

/// The check-session iframe document. Cacheable; it reads the OP browser
/// state cookie client-side and answers RP `postMessage` probes with
/// `changed` / `unchanged` / `error`.
pub fn check_session_page(cookie_name: &str) -> String {
    let handlebars = handlebars::Handlebars::new();
    handlebars
        .render_template(
            r#"<!DOCTYPE html>
<html>
<head><title>Check Session</title>
<script>
function getOpbs() {
  var match = document.cookie.match(new RegExp('(^| ){{cookie}}=([^;]+)'));
  return match ? match[2] : null;
}
async function computeSessionState(clientId, origin, opbs, salt) {
  var data = new TextEncoder().encode(clientId + ' ' + origin + ' ' + opbs + ' ' + salt);
  var digest = await crypto.subtle.digest('SHA-256', data);
  var b64 = btoa(String.fromCharCode.apply(null, new Uint8Array(digest)));
  return b64.replace(/\+/g, '-').replace(/\//g, '_').replace(/=+$/, '') + '.' + salt;
}
window.addEventListener('message', async function (e) {
  var parts = (e.data || '').split(' ');
  if (parts.length !== 2) { e.source.postMessage('error', e.origin); return; }
  var clientId = parts[0];
  var sessionState = parts[1];
  var salt = sessionState.split('.')[1];
  var opbs = getOpbs();
  if (!salt || !opbs) { e.source.postMessage('changed', e.origin); return; }
  var expected = await computeSessionState(clientId, e.origin, opbs, salt);
  e.source.postMessage(expected === sessionState ? 'unchanged' : 'changed', e.origin);
}, false);
</script>
</head>
<body></body>
</html>
"#,
            &serde_json::json!({ "cookie": cookie_name }),
        )
        .expect("static template renders")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_is_salt_suffixed() {
        let value = session_state_value("client", "https://app.example.com", "opbs-1");
        let (hash, salt) = value.split_once('.').unwrap();
        assert!(!hash.is_empty());
        assert_eq!(
            compute_session_state("client", "https://app.example.com", "opbs-1", salt),
            value
        );
    }

    #[test]
    fn different_origins_yield_different_states() {
        let a = compute_session_state("client", "https://a.example.com", "opbs", "salt");
        let b = compute_session_state("client", "https://b.example.com", "opbs", "salt");
        assert_ne!(a, b);
    }
}
