// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Visitor identity resolution.
//!
//! The frontend persists a random identifier per browser and sends it with
//! every public write. It outlives network changes, so it takes precedence
//! over the peer address.

use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;

/// Placeholder used when neither an identifier nor an address is known.
pub const ANONYMOUS: &str = "anonymous";

const MAX_CLIENT_ID_LEN: usize = 128;

/// Where an identity key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    Client,
    Network,
    Anonymous,
}

/// Stable per-visitor key used for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    source: IdentitySource,
    value: String,
}

impl IdentityKey {
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            source: IdentitySource::Client,
            value: id.into(),
        }
    }

    pub fn network(ip: IpAddr) -> Self {
        Self {
            source: IdentitySource::Network,
            value: ip.to_string(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            source: IdentitySource::Anonymous,
            value: ANONYMOUS.to_string(),
        }
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            IdentitySource::Client => write!(f, "client:{}", self.value),
            IdentitySource::Network => write!(f, "ip:{}", self.value),
            IdentitySource::Anonymous => f.write_str(&self.value),
        }
    }
}

/// Resolves identity keys from request parts.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    body_field: String,
    header: String,
}

impl IdentityResolver {
    pub fn new(body_field: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            body_field: body_field.into(),
            header: header.into(),
        }
    }

    /// Body identifier, then header identifier, then network address.
    pub fn resolve(
        &self,
        body: &Map<String, Value>,
        headers: &HeaderMap,
        addr: Option<IpAddr>,
    ) -> IdentityKey {
        let from_body = body
            .get(&self.body_field)
            .and_then(Value::as_str)
            .and_then(sanitize_client_id);
        let from_header = || {
            headers
                .get(self.header.as_str())
                .and_then(|v| v.to_str().ok())
                .and_then(sanitize_client_id)
        };

        if let Some(id) = from_body.or_else(from_header) {
            return IdentityKey::client(id);
        }

        match addr {
            Some(ip) => IdentityKey::network(ip),
            None => IdentityKey::anonymous(),
        }
    }
}

/// Network address of the caller, honouring X-Forwarded-For behind a proxy.
///
/// Only the last entry is used: it is the one the fronting proxy appended,
/// while earlier entries come from the client and can be forged.
pub fn network_address(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|last| last.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    peer
}

fn sanitize_client_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_CLIENT_ID_LEN || id.chars().any(char::is_control) {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new("client_uuid", "x-client-uuid")
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn headers_with(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-client-uuid", HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_body_identifier_wins() {
        let key = resolver().resolve(
            &body(json!({ "client_uuid": "body-id" })),
            &headers_with("header-id"),
            Some("10.0.0.1".parse().unwrap()),
        );
        assert_eq!(key, IdentityKey::client("body-id"));
        assert_eq!(key.to_string(), "client:body-id");
    }

    #[test]
    fn test_header_used_when_body_missing() {
        let key = resolver().resolve(
            &body(json!({ "message": "hi" })),
            &headers_with("header-id"),
            Some("10.0.0.1".parse().unwrap()),
        );
        assert_eq!(key, IdentityKey::client("header-id"));
    }

    #[test]
    fn test_falls_back_to_network_address() {
        let ip: IpAddr = "192.168.1.7".parse().unwrap();
        let key = resolver().resolve(&Map::new(), &HeaderMap::new(), Some(ip));
        assert_eq!(key.source(), IdentitySource::Network);
        assert_eq!(key.to_string(), "ip:192.168.1.7");
    }

    #[test]
    fn test_placeholder_when_nothing_known() {
        let key = resolver().resolve(&Map::new(), &HeaderMap::new(), None);
        assert_eq!(key, IdentityKey::anonymous());
        assert_eq!(key.to_string(), ANONYMOUS);
    }

    #[test]
    fn test_invalid_identifiers_fall_through() {
        let ip: IpAddr = "10.1.1.1".parse().unwrap();
        let oversized = "x".repeat(MAX_CLIENT_ID_LEN + 1);

        for bad in [json!("   "), json!(oversized), json!("a\u{0007}b"), json!(42)] {
            let key = resolver().resolve(&body(json!({ "client_uuid": bad })), &HeaderMap::new(), Some(ip));
            assert_eq!(key, IdentityKey::network(ip), "{bad} should be ignored");
        }
    }

    #[test]
    fn test_client_id_cannot_impersonate_address_bucket() {
        let ip: IpAddr = "10.0.0.9".parse().unwrap();
        let spoof = resolver().resolve(
            &body(json!({ "client_uuid": "10.0.0.9" })),
            &HeaderMap::new(),
            None,
        );
        assert_ne!(spoof, IdentityKey::network(ip));
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));
        let peer: IpAddr = "10.0.0.1".parse().unwrap();

        assert_eq!(network_address(&headers, Some(peer), false), Some(peer));
        assert_eq!(
            network_address(&headers, Some(peer), true),
            Some("203.0.113.5".parse().unwrap())
        );
        assert_eq!(network_address(&HeaderMap::new(), Some(peer), true), Some(peer));
    }

    #[test]
    fn test_forwarded_for_uses_proxy_appended_entry() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 203.0.113.5"));
        assert_eq!(
            network_address(&headers, Some(peer), true),
            Some("203.0.113.5".parse().unwrap())
        );

        // A forged prefix does not move the visitor into another bucket
        let mut forged = HeaderMap::new();
        forged.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1, 203.0.113.5"));
        assert_eq!(
            network_address(&forged, Some(peer), true),
            network_address(&headers, Some(peer), true)
        );

        let mut garbage = HeaderMap::new();
        garbage.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, not-an-ip"));
        assert_eq!(network_address(&garbage, Some(peer), true), Some(peer));
    }
}
