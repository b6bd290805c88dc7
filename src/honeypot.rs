// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Honeypot field detection.
//!
//! The contact and testimonial forms render fields that people cannot see
//! or reach. Anything that fills them in is a bot, whether it went through
//! the form or posted straight at the endpoint, so detection runs on the
//! raw payload.

use crate::config::HoneypotConfig;
use crate::pipeline::RouteClass;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Result of a honeypot check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoneypotResult {
    Clean,
    Triggered { field: String },
}

impl HoneypotResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// Detects populated honeypot fields.
#[derive(Debug, Clone)]
pub struct HoneypotDetector {
    config: HoneypotConfig,
}

impl HoneypotDetector {
    pub fn new(config: HoneypotConfig) -> Self {
        Self { config }
    }

    /// Check the fields declared for `route`.
    pub fn check(&self, fields: &Map<String, Value>, route: RouteClass) -> HoneypotResult {
        for name in self.config.for_route(route) {
            if let Some(value) = fields.get(name) {
                if is_populated(value) {
                    debug!(%route, field = %name, "Honeypot field populated");
                    return HoneypotResult::Triggered { field: name.clone() };
                }
            }
        }
        HoneypotResult::Clean
    }

    /// Every declared honeypot name across all routes.
    pub fn all_field_names(&self) -> BTreeSet<&str> {
        RouteClass::ALL
            .iter()
            .flat_map(|route| self.config.for_route(*route))
            .map(String::as_str)
            .collect()
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(is_populated),
        Value::Object(map) => map.values().any(is_populated),
    }
}
