// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Environment-derived security policy.
//!
//! Every check that behaves differently in production and development reads
//! its behaviour from one [`SecurityPolicy`] built at startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    #[default]
    Development,
    Test,
}

#[derive(Debug, Error)]
#[error("unknown environment: {0}")]
pub struct UnknownEnvironment(String);

impl Environment {
    /// Production and staging share the strict policy.
    pub fn is_production_like(self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
            Self::Test => "test",
        };
        f.write_str(name)
    }
}

/// Behavioural switches shared by all checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Reject requests that carry no challenge token.
    pub require_verification: bool,
    /// Admit requests when the verification service cannot be reached.
    pub fail_open_on_service_error: bool,
    /// Reject submissions whose timing token is missing or undecodable.
    pub reject_malformed_timing_token: bool,
}

impl SecurityPolicy {
    /// Strict in production-like environments, permissive elsewhere.
    pub fn for_environment(env: Environment) -> Self {
        if env.is_production_like() {
            Self::strict()
        } else {
            Self::permissive()
        }
    }

    pub const fn strict() -> Self {
        Self {
            require_verification: true,
            fail_open_on_service_error: false,
            reject_malformed_timing_token: true,
        }
    }

    pub const fn permissive() -> Self {
        Self {
            require_verification: false,
            fail_open_on_service_error: true,
            reject_malformed_timing_token: false,
        }
    }
}
