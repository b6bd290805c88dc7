// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Challenge verification gate.
//!
//! Forwards the widget token to Cloudflare Turnstile `siteverify` and turns
//! the answer into a [`VerificationOutcome`]. What happens when the token is
//! missing or the service cannot be reached depends on the injected
//! [`SecurityPolicy`], and only on it.

use crate::config::VerificationConfig;
use crate::metrics::Metrics;
use crate::policy::SecurityPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Turnstile rejects tokens longer than this without looking at them.
pub const MAX_TOKEN_LEN: usize = 2048;

/// Why a verification succeeded or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    Success,
    TokenMissing,
    TokenInvalid,
    ServiceUnavailable,
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::TokenMissing => "token_missing",
            Self::TokenInvalid => "token_invalid",
            Self::ServiceUnavailable => "service_unavailable",
        };
        f.write_str(s)
    }
}

/// Result of the verification gate.
///
/// A fail-open pass during an outage is `verified: true` with reason
/// `ServiceUnavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub reason: VerificationReason,
}

impl VerificationOutcome {
    pub const fn passed(reason: VerificationReason) -> Self {
        Self {
            verified: true,
            reason,
        }
    }

    pub const fn rejected(reason: VerificationReason) -> Self {
        Self {
            verified: false,
            reason,
        }
    }
}

/// Failures talking to the verification service.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("verification service returned HTTP {0}")]
    Status(u16),

    #[error("verification service is not configured")]
    NotConfigured,
}

/// `siteverify` response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteVerifyResponse {
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Third-party challenge verification service.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<SiteVerifyResponse, VerifierError>;
}

/// Cloudflare Turnstile client.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: String,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(
        secret: impl Into<String>,
        verify_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VerifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            secret: secret.into(),
            verify_url: verify_url.into(),
        })
    }

    /// `None` when no secret key is configured.
    pub fn from_config(config: &VerificationConfig) -> Result<Option<Self>, VerifierError> {
        match &config.secret_key {
            Some(secret) => Ok(Some(Self::new(
                secret.clone(),
                config.verify_url.clone(),
                config.timeout(),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<IpAddr>,
    ) -> Result<SiteVerifyResponse, VerifierError> {
        let mut form = vec![("secret", self.secret.clone()), ("response", token.to_string())];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip.to_string()));
        }

        let response = self.client.post(&self.verify_url).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(VerifierError::Status(response.status().as_u16()));
        }

        Ok(response.json::<SiteVerifyResponse>().await?)
    }
}

/// Applies the security policy around a [`ChallengeVerifier`].
pub struct VerificationGate {
    verifier: Option<Arc<dyn ChallengeVerifier>>,
    policy: SecurityPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl VerificationGate {
    pub fn new(verifier: Option<Arc<dyn ChallengeVerifier>>, policy: SecurityPolicy) -> Self {
        Self {
            verifier,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// Verify `token`, applying the missing-token and outage policy.
    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<IpAddr>) -> VerificationOutcome {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ if self.policy.require_verification => {
                debug!("Challenge token missing");
                return VerificationOutcome::rejected(VerificationReason::TokenMissing);
            }
            _ => {
                debug!("Challenge token missing, verification not required");
                return VerificationOutcome::passed(VerificationReason::Success);
            }
        };

        if token.len() > MAX_TOKEN_LEN {
            debug!(len = token.len(), "Challenge token exceeds maximum length");
            return VerificationOutcome::rejected(VerificationReason::TokenInvalid);
        }

        let verifier = match &self.verifier {
            Some(v) => v,
            None => return self.service_failure(&VerifierError::NotConfigured),
        };

        let started = Instant::now();
        let result = verifier.verify(token, remote_ip).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_verification(started.elapsed());
        }

        match result {
            Ok(response) if response.success => {
                debug!(hostname = ?response.hostname, action = ?response.action, "Challenge verified");
                VerificationOutcome::passed(VerificationReason::Success)
            }
            Ok(response) => {
                info!(error_codes = ?response.error_codes, "Challenge token rejected by service");
                VerificationOutcome::rejected(VerificationReason::TokenInvalid)
            }
            Err(e) => self.service_failure(&e),
        }
    }

    fn service_failure(&self, err: &VerifierError) -> VerificationOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.record_verification_failure();
        }

        let fail_open = self.policy.fail_open_on_service_error;
        match err {
            VerifierError::NotConfigured => {
                warn!(fail_open, "Challenge verification is not configured")
            }
            _ => error!(error = %err, fail_open, "Challenge verification service unavailable"),
        }

        if fail_open {
            VerificationOutcome::passed(VerificationReason::ServiceUnavailable)
        } else {
            VerificationOutcome::rejected(VerificationReason::ServiceUnavailable)
        }
    }
}
