// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the submission guard.
//!
//! Defaults mirror the quotas the portfolio backend has always enforced:
//! three contact messages or testimonials per hour and fifteen chat
//! messages per quarter hour per visitor.

use crate::pipeline::RouteClass;
use crate::policy::{Environment, SecurityPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors detected while loading or by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit for {route} must have a non-zero window and max")]
    ZeroRateLimit { route: RouteClass },

    #[error("invalid URL for {name}: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("verification timeout must be non-zero")]
    ZeroTimeout,

    #[error("rate limit cleanup interval must be non-zero")]
    ZeroCleanupInterval,

    #[error("metrics path must start with '/': {0}")]
    InvalidMetricsPath(String),

    #[error("chat upstream timeout must be non-zero")]
    ZeroChatTimeout,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Explicit overrides for the environment-derived security policy
    #[serde(default)]
    pub policy_overrides: PolicyOverrides,

    /// Per-route fixed-window quotas
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Timing gate configuration
    #[serde(default)]
    pub timing: TimingConfig,

    /// Honeypot field declarations
    #[serde(default)]
    pub honeypot: HoneypotConfig,

    /// Disposable email denylist additions
    #[serde(default)]
    pub disposable: DisposableConfig,

    /// Challenge verification service
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Names of the internal control fields in submitted payloads
    #[serde(default)]
    pub fields: FieldNames,

    /// HTTP surface configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Optional overrides applied on top of [`SecurityPolicy::for_environment`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub require_verification: Option<bool>,
    pub fail_open_on_service_error: Option<bool>,
    pub reject_malformed_timing_token: Option<bool>,
}

/// Fixed-window quota for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max: u32,
}

impl RouteLimit {
    pub const fn new(window_ms: u64, max: u32) -> Self {
        Self { window_ms, max }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate limiting configuration, one quota per route class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_contact_limit")]
    pub contact: RouteLimit,

    #[serde(default = "default_testimonial_limit")]
    pub testimonial: RouteLimit,

    #[serde(default = "default_chat_limit")]
    pub chat: RouteLimit,

    /// Interval between expired-bucket sweeps in seconds (default: 60)
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_interval_secs: u64,
}

/// Timing gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum plausible time between form render and submit (default: 3000)
    #[serde(default = "default_min_elapsed_ms")]
    pub min_elapsed_ms: u64,
}

/// Honeypot field names per route class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoneypotConfig {
    #[serde(default = "default_honeypot_fields")]
    pub contact: Vec<String>,

    #[serde(default = "default_honeypot_fields")]
    pub testimonial: Vec<String>,

    #[serde(default)]
    pub chat: Vec<String>,
}

/// Disposable domain filter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisposableConfig {
    /// Domains added to the built-in denylist
    #[serde(default)]
    pub extra_domains: Vec<String>,
}

/// Challenge verification service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Turnstile secret key; verification cannot succeed without it
    #[serde(default)]
    pub secret_key: Option<String>,

    /// siteverify endpoint
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Outbound call timeout in milliseconds (default: 5000)
    #[serde(default = "default_verification_timeout_ms")]
    pub timeout_ms: u64,
}

/// Field names of the control values the client embeds in payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldNames {
    #[serde(default = "default_client_id_field")]
    pub client_id: String,

    #[serde(default = "default_client_id_header")]
    pub client_id_header: String,

    #[serde(default = "default_submission_token_field")]
    pub submission_token: String,

    #[serde(default = "default_challenge_token_field")]
    pub challenge_token: String,

    #[serde(default = "default_email_field")]
    pub email: String,
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Use the last X-Forwarded-For entry, the hop appended by the
    /// fronting proxy, as the network address
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Upstream chat responder; chat is unavailable when unset
    #[serde(default)]
    pub chat_upstream_url: Option<String>,

    /// Upstream chat call timeout in milliseconds (default: 30000)
    #[serde(default = "default_chat_upstream_timeout_ms")]
    pub chat_upstream_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_chat_upstream_timeout_ms() -> u64 {
    30_000
}

fn default_contact_limit() -> RouteLimit {
    RouteLimit::new(60 * 60 * 1000, 3)
}

fn default_testimonial_limit() -> RouteLimit {
    RouteLimit::new(60 * 60 * 1000, 3)
}

fn default_chat_limit() -> RouteLimit {
    RouteLimit::new(15 * 60 * 1000, 15)
}

fn default_cleanup_secs() -> u64 {
    60
}

fn default_min_elapsed_ms() -> u64 {
    3000
}

fn default_honeypot_fields() -> Vec<String> {
    vec![
        "fax".to_string(),
        "website_url".to_string(),
        "company_name".to_string(),
    ]
}

fn default_verify_url() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}

fn default_verification_timeout_ms() -> u64 {
    5000
}

fn default_client_id_field() -> String {
    "client_uuid".to_string()
}

fn default_client_id_header() -> String {
    "x-client-uuid".to_string()
}

fn default_submission_token_field() -> String {
    "submission_token".to_string()
}

fn default_challenge_token_field() -> String {
    "turnstile_token".to_string()
}

fn default_email_field() -> String {
    "email".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            environment: Environment::default(),
            policy_overrides: PolicyOverrides::default(),
            rate_limit: RateLimitConfig::default(),
            timing: TimingConfig::default(),
            honeypot: HoneypotConfig::default(),
            disposable: DisposableConfig::default(),
            verification: VerificationConfig::default(),
            fields: FieldNames::default(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            contact: default_contact_limit(),
            testimonial: default_testimonial_limit(),
            chat: default_chat_limit(),
            cleanup_interval_secs: default_cleanup_secs(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_elapsed_ms: default_min_elapsed_ms(),
        }
    }
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            contact: default_honeypot_fields(),
            testimonial: default_honeypot_fields(),
            chat: Vec::new(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: default_verify_url(),
            timeout_ms: default_verification_timeout_ms(),
        }
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            client_id: default_client_id_field(),
            client_id_header: default_client_id_header(),
            submission_token: default_submission_token_field(),
            challenge_token: default_challenge_token_field(),
            email: default_email_field(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            trust_forwarded_for: false,
            chat_upstream_url: None,
            chat_upstream_timeout_ms: default_chat_upstream_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Quota for a route class.
    pub fn for_route(&self, route: RouteClass) -> RouteLimit {
        match route {
            RouteClass::Contact => self.contact,
            RouteClass::Testimonial => self.testimonial,
            RouteClass::Chat => self.chat,
        }
    }

    /// Get the cleanup interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl HoneypotConfig {
    /// Declared honeypot names for a route class.
    pub fn for_route(&self, route: RouteClass) -> &[String] {
        match route {
            RouteClass::Contact => &self.contact,
            RouteClass::Testimonial => &self.testimonial,
            RouteClass::Chat => &self.chat,
        }
    }
}

impl VerificationConfig {
    /// Get the outbound timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServerConfig {
    pub fn chat_upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_upstream_timeout_ms)
    }
}

impl Config {
    /// Security policy for the configured environment with overrides applied.
    pub fn security_policy(&self) -> SecurityPolicy {
        let mut policy = SecurityPolicy::for_environment(self.environment);
        let overrides = &self.policy_overrides;
        if let Some(v) = overrides.require_verification {
            policy.require_verification = v;
        }
        if let Some(v) = overrides.fail_open_on_service_error {
            policy.fail_open_on_service_error = v;
        }
        if let Some(v) = overrides.reject_malformed_timing_token {
            policy.reject_malformed_timing_token = v;
        }
        policy
    }

    /// Check invariants the rest of the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for route in RouteClass::ALL {
            let limit = self.rate_limit.for_route(route);
            if limit.window_ms == 0 || limit.max == 0 {
                return Err(ConfigError::ZeroRateLimit { route });
            }
        }

        if self.rate_limit.cleanup_interval_secs == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }

        if self.verification.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        if self.server.chat_upstream_timeout_ms == 0 {
            return Err(ConfigError::ZeroChatTimeout);
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(self.metrics.path.clone()));
        }

        check_url("verification.verify_url", &self.verification.verify_url)?;
        if let Some(upstream) = &self.server.chat_upstream_url {
            check_url("server.chat_upstream_url", upstream)?;
        }

        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults. Unparseable tuning values are
    /// logged and keep their defaults; an unparseable `APP_ENV` or policy
    /// override is an error, since guessing would pick a security posture.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let route_limit = |prefix: &str, fallback: RouteLimit| RouteLimit {
            window_ms: parse_or(&get, &format!("{prefix}_RATE_WINDOW_MS"), fallback.window_ms),
            max: parse_or(&get, &format!("{prefix}_RATE_MAX"), fallback.max),
        };

        let mut extra_domains = Vec::new();
        if let Some(list) = get("DISPOSABLE_DOMAINS_EXTRA") {
            extra_domains = split_list(&list);
        }

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            environment: parse_strict(&get, "APP_ENV")?.unwrap_or(defaults.environment),
            policy_overrides: PolicyOverrides {
                require_verification: parse_strict(&get, "REQUIRE_VERIFICATION")?,
                fail_open_on_service_error: parse_strict(&get, "VERIFICATION_FAIL_OPEN")?,
                reject_malformed_timing_token: parse_strict(
                    &get,
                    "REJECT_MALFORMED_SUBMISSION_TOKEN",
                )?,
            },
            rate_limit: RateLimitConfig {
                contact: route_limit("CONTACT", defaults.rate_limit.contact),
                testimonial: route_limit("TESTIMONIAL", defaults.rate_limit.testimonial),
                chat: route_limit("CHAT", defaults.rate_limit.chat),
                cleanup_interval_secs: parse_or(
                    &get,
                    "RATE_LIMIT_CLEANUP_SECS",
                    defaults.rate_limit.cleanup_interval_secs,
                ),
            },
            timing: TimingConfig {
                min_elapsed_ms: parse_or(&get, "MIN_SUBMIT_ELAPSED_MS", defaults.timing.min_elapsed_ms),
            },
            honeypot: defaults.honeypot,
            disposable: DisposableConfig { extra_domains },
            verification: VerificationConfig {
                secret_key: get("TURNSTILE_SECRET_KEY"),
                verify_url: get("TURNSTILE_VERIFY_URL").unwrap_or(defaults.verification.verify_url),
                timeout_ms: parse_or(&get, "VERIFICATION_TIMEOUT_MS", defaults.verification.timeout_ms),
            },
            fields: defaults.fields,
            server: ServerConfig {
                allowed_origins: get("ALLOWED_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.server.allowed_origins),
                trust_forwarded_for: parse_or(&get, "TRUST_FORWARDED_FOR", false),
                chat_upstream_url: get("CHAT_UPSTREAM_URL"),
                chat_upstream_timeout_ms: parse_or(
                    &get,
                    "CHAT_UPSTREAM_TIMEOUT_MS",
                    defaults.server.chat_upstream_timeout_ms,
                ),
            },
            metrics: MetricsConfig {
                enabled: parse_or(&get, "METRICS_ENABLED", defaults.metrics.enabled),
                path: get("METRICS_PATH").unwrap_or(defaults.metrics.path),
            },
        })
    }
}

/// Parse a variable whose value must never be guessed.
fn parse_strict<T, F>(get: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.trim().parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

fn parse_opt<T, F>(get: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparseable configuration value");
            None
        }
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    parse_opt(get, key).unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}
