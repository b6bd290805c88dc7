// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use serde_json::{json, Map, Value};
use std::net::{IpAddr, Ipv4Addr};
use submission_guard::timing::encode_submission_token;
use submission_guard::RouteClass;

/// Challenge token the stub verifier accepts.
pub const VALID_CHALLENGE: &str = "valid-challenge";

/// Challenge token the stub verifier refuses.
pub const FORGED_CHALLENGE: &str = "forged-challenge";

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate browser identifiers shaped like `crypto.randomUUID()` output.
pub fn generate_client_ids(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("6f1c2d3e-0000-4000-8000-{:012x}", i))
        .collect()
}

/// Honeypot values bots commonly stuff into hidden inputs.
pub fn generate_honeypot_values() -> Vec<Value> {
    vec![
        json!("555-0100"),
        json!("https://cheap-pills.example.net"),
        json!("ACME Corp"),
        json!(["spam"]),
        json!({ "nested": "value" }),
        json!(1),
        json!(true),
    ]
}

/// Throwaway addresses, including subdomains and odd casing.
pub fn generate_disposable_emails() -> Vec<&'static str> {
    vec![
        "bot@mailinator.com",
        "bot@MAILINATOR.COM",
        "bot@yopmail.com",
        "bot@guerrillamail.com",
        "bot@10minutemail.com",
        "bot@temp-mail.org",
        "bot@eu.mailinator.com",
        " bot@sharklasers.com ",
    ]
}

/// Addresses that must never be flagged.
pub fn generate_legitimate_emails() -> Vec<&'static str> {
    vec![
        "jane@example.com",
        "jean@example.fr",
        "ops@company.co.uk",
        "someone@mailinator-fan.example.com",
        "first.last+tag@gmail.com",
    ]
}

/// Submission token for a form rendered `elapsed_ms` before `now_ms`.
pub fn submission_token(now_ms: i64, elapsed_ms: i64) -> String {
    encode_submission_token(now_ms - elapsed_ms)
}

/// Content fields a human would fill for `route`.
pub fn human_fields(route: RouteClass, index: usize) -> Map<String, Value> {
    let value = match route {
        RouteClass::Contact => json!({
            "name": format!("Visitor {index}"),
            "email": format!("visitor{index}@example.com"),
            "subject": "Project enquiry",
            "message": "Hello, I would like to talk about a project.",
        }),
        RouteClass::Testimonial => json!({
            "author": format!("Client {index}"),
            "role": "CTO",
            "contentEn": "Great work, delivered on time.",
            "contentFr": "Excellent travail, livré à temps.",
        }),
        RouteClass::Chat => json!({
            "message": "What technologies do you work with?",
        }),
    };

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Deterministic "random" choice based on index and ratio.
pub fn pick(ratio: f64, index: usize) -> bool {
    if ratio >= 1.0 {
        true
    } else if ratio <= 0.0 {
        false
    } else {
        (index as f64 * 0.618033988749895) % 1.0 < ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_generate_client_ids() {
        let ids = generate_client_ids(100);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 100);
        assert!(ids.iter().all(|id| id.len() == 36));
    }

    #[test]
    fn test_pick_extremes() {
        assert!((0..50).all(|i| pick(1.0, i)));
        assert!((0..50).all(|i| !pick(0.0, i)));
        let hits = (0..1000).filter(|&i| pick(0.1, i)).count();
        assert!((50..150).contains(&hits), "got {hits}");
    }
}
