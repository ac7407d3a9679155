// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # JWT claim set
//!
//! A claim set is a JSON object with strongly-typed accessors for the
//! registered claims the engine reads. Multi-valued claims (`aud`, `amr`)
//! serialize as JSON arrays; `aud` additionally accepts the single-string
//! form on input per RFC 7519 §4.1.3.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of a JWT: an arbitrary JSON object plus typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(pub Map<String, Value>);

impl ClaimSet {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn set_str(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, Value::String(value.into()));
    }

    pub fn set_i64(&mut self, name: &str, value: i64) {
        self.set(name, Value::from(value));
    }

    /// Set a claim only when it is not already present.
    pub fn set_default(&mut self, name: &str, value: Value) {
        self.0.entry(name.to_string()).or_insert(value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    // Registered claim accessors.

    pub fn iss(&self) -> Option<&str> {
        self.get_str("iss")
    }

    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Audience, normalized to a list: a JSON string reads as one element,
    /// a JSON array as its string members.
    pub fn aud(&self) -> Vec<String> {
        match self.0.get("aud") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Set the audience; one value serializes as a string, several as an
    /// array.
    pub fn set_aud(&mut self, audiences: &[String]) {
        match audiences {
            [] => {
                self.0.remove("aud");
            }
            [single] => self.set_str("aud", single.clone()),
            many => self.set(
                "aud",
                Value::Array(many.iter().map(|a| Value::String(a.clone())).collect()),
            ),
        }
    }

    pub fn exp(&self) -> Option<i64> {
        self.get_i64("exp")
    }

    pub fn iat(&self) -> Option<i64> {
        self.get_i64("iat")
    }

    pub fn nbf(&self) -> Option<i64> {
        self.get_i64("nbf")
    }

    pub fn jti(&self) -> Option<&str> {
        self.get_str("jti")
    }

    pub fn scope(&self) -> Option<&str> {
        self.get_str("scope")
    }

    /// Scope tokens of the space-separated `scope` claim.
    pub fn scopes(&self) -> Vec<String> {
        self.scope()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get_str("client_id")
    }

    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }

    pub fn acr(&self) -> Option<&str> {
        self.get_str("acr")
    }

    /// Authentication method references, always a list.
    pub fn amr(&self) -> Vec<String> {
        match self.0.get("amr") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn auth_time(&self) -> Option<i64> {
        self.get_i64("auth_time")
    }

    /// Confirmation claim thumbprint (`cnf.x5t#S256`), RFC 8705.
    pub fn cnf_x5t_s256(&self) -> Option<&str> {
        self.0
            .get("cnf")
            .and_then(|cnf| cnf.get("x5t#S256"))
            .and_then(Value::as_str)
    }

    /// The claim set as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aud_accepts_string_and_array() {
        let single: ClaimSet = serde_json::from_str(r#"{"aud":"one"}"#).unwrap();
        assert_eq!(single.aud(), vec!["one"]);

        let many: ClaimSet = serde_json::from_str(r#"{"aud":["one","two"]}"#).unwrap();
        assert_eq!(many.aud(), vec!["one", "two"]);
    }

    #[test]
    fn multivalued_aud_serializes_as_array() {
        let mut claims = ClaimSet::new();
        claims.set_aud(&["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(json, r#"{"aud":["a","b"]}"#);
    }

    #[test]
    fn cnf_thumbprint_is_read_from_nested_object() {
        let claims: ClaimSet =
            serde_json::from_str(r#"{"cnf":{"x5t#S256":"thumb"}}"#).unwrap();
        assert_eq!(claims.cnf_x5t_s256(), Some("thumb"));
    }
}
