// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission pipeline.
//!
//! Runs the per-route checks in a fixed order and stops at the first
//! failure:
//!
//! 1. Honeypot fields
//! 2. Disposable email domain (when an email is present)
//! 3. Challenge verification
//! 4. Submission timing
//!
//! Chat messages only go through challenge verification. Accepted payloads
//! leave without any of the control fields the client embedded.

use crate::config::{Config, FieldNames};
use crate::disposable::{DisposableDomainFilter, DomainCheck};
use crate::error::SubmissionError;
use crate::honeypot::{HoneypotDetector, HoneypotResult};
use crate::identity::IdentityKey;
use crate::policy::SecurityPolicy;
use crate::timing::{TimingGate, TimingOutcome};
use crate::verification::{VerificationGate, VerificationReason};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Public write route classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    Contact,
    Testimonial,
    Chat,
}

impl RouteClass {
    pub const ALL: [RouteClass; 3] = [Self::Contact, Self::Testimonial, Self::Chat];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Testimonial => "testimonial",
            Self::Chat => "chat",
        }
    }

    /// Whether the route accepts publishable content and gets the full screen.
    pub fn screens_content(self) -> bool {
        !matches!(self, Self::Chat)
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight submission under evaluation.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub route: RouteClass,
    pub identity: IdentityKey,
    pub fields: Map<String, Value>,
    pub submission_token: Option<String>,
    pub challenge_token: Option<String>,
    pub remote_ip: Option<IpAddr>,
}

impl SubmissionAttempt {
    /// Build an attempt, reading the control tokens out of `fields`.
    pub fn from_payload(
        route: RouteClass,
        identity: IdentityKey,
        fields: Map<String, Value>,
        remote_ip: Option<IpAddr>,
        names: &FieldNames,
    ) -> Self {
        let token = |name: &str| fields.get(name).and_then(Value::as_str).map(str::to_string);
        let submission_token = token(&names.submission_token);
        let challenge_token = token(&names.challenge_token);

        Self {
            route,
            identity,
            fields,
            submission_token,
            challenge_token,
            remote_ip,
        }
    }
}

/// Internal reason a submission was rejected. Logged, never shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    Honeypot { field: String },
    DisposableEmail { domain: String },
    Verification(VerificationReason),
    SubmissionTooFast { elapsed_ms: i64 },
    MalformedSubmissionToken,
    MissingSubmissionToken,
}

impl RejectionReason {
    /// Map to the caller-facing error category.
    pub fn into_error(self) -> SubmissionError {
        match self {
            Self::Verification(VerificationReason::ServiceUnavailable) => {
                SubmissionError::ExternalServiceUnavailable
            }
            _ => SubmissionError::ValidationRejected,
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Honeypot { field } => write!(f, "honeypot field {field} populated"),
            Self::DisposableEmail { domain } => write!(f, "disposable email domain {domain}"),
            Self::Verification(reason) => write!(f, "challenge verification failed: {reason}"),
            Self::SubmissionTooFast { elapsed_ms } => {
                write!(f, "submitted {elapsed_ms}ms after render")
            }
            Self::MalformedSubmissionToken => f.write_str("malformed submission token"),
            Self::MissingSubmissionToken => f.write_str("missing submission token"),
        }
    }
}

/// Pipeline verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Cleaned fields, ready for the content collaborator
    Accepted(Map<String, Value>),
    Rejected(RejectionReason),
}

impl PipelineOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Orchestrates the checks for one submission.
pub struct SubmissionPipeline {
    honeypot: HoneypotDetector,
    disposable: DisposableDomainFilter,
    verification: VerificationGate,
    timing: TimingGate,
    policy: SecurityPolicy,
    fields: FieldNames,
    stripped: BTreeSet<String>,
}

impl SubmissionPipeline {
    pub fn new(
        honeypot: HoneypotDetector,
        disposable: DisposableDomainFilter,
        verification: VerificationGate,
        timing: TimingGate,
        policy: SecurityPolicy,
        fields: FieldNames,
    ) -> Self {
        let mut stripped: BTreeSet<String> = honeypot
            .all_field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        stripped.insert(fields.submission_token.clone());
        stripped.insert(fields.challenge_token.clone());
        stripped.insert(fields.client_id.clone());

        Self {
            honeypot,
            disposable,
            verification,
            timing,
            policy,
            fields,
            stripped,
        }
    }

    /// Assemble the pipeline from configuration around a verification gate.
    pub fn from_config(config: &Config, verification: VerificationGate) -> Self {
        Self::new(
            HoneypotDetector::new(config.honeypot.clone()),
            DisposableDomainFilter::new(&config.disposable.extra_domains),
            verification,
            TimingGate::new(config.timing.min_elapsed_ms),
            config.security_policy(),
            config.fields.clone(),
        )
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    pub fn field_names(&self) -> &FieldNames {
        &self.fields
    }

    /// Evaluate `attempt` against the current wall clock.
    pub async fn process(&self, attempt: SubmissionAttempt) -> PipelineOutcome {
        self.process_at(attempt, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Evaluate `attempt` as if the clock read `now_ms`.
    pub async fn process_at(&self, attempt: SubmissionAttempt, now_ms: i64) -> PipelineOutcome {
        let route = attempt.route;
        match self.screen(&attempt, now_ms).await {
            Ok(()) => {
                debug!(%route, identity = %attempt.identity, "Submission accepted");
                PipelineOutcome::Accepted(self.strip(attempt.fields))
            }
            Err(reason) => {
                info!(
                    %route,
                    identity = %attempt.identity,
                    reason = %reason,
                    "Submission rejected"
                );
                PipelineOutcome::Rejected(reason)
            }
        }
    }

    async fn screen(&self, attempt: &SubmissionAttempt, now_ms: i64) -> Result<(), RejectionReason> {
        let route = attempt.route;

        if route.screens_content() {
            if let HoneypotResult::Triggered { field } = self.honeypot.check(&attempt.fields, route) {
                return Err(RejectionReason::Honeypot { field });
            }

            let email = attempt.fields.get(&self.fields.email).and_then(Value::as_str);
            if let Some(email) = email {
                if let DomainCheck::Disposable { domain } = self.disposable.check(email) {
                    return Err(RejectionReason::DisposableEmail { domain });
                }
            }
        }

        let verification = self
            .verification
            .verify(attempt.challenge_token.as_deref(), attempt.remote_ip)
            .await;
        if !verification.verified {
            return Err(RejectionReason::Verification(verification.reason));
        }

        if route.screens_content() {
            self.check_timing(attempt, now_ms)?;
        }

        Ok(())
    }

    fn check_timing(&self, attempt: &SubmissionAttempt, now_ms: i64) -> Result<(), RejectionReason> {
        let reason = match self.timing.check(attempt.submission_token.as_deref(), now_ms) {
            TimingOutcome::Passed { .. } => return Ok(()),
            TimingOutcome::TooFast { elapsed_ms } => {
                return Err(RejectionReason::SubmissionTooFast { elapsed_ms })
            }
            TimingOutcome::Malformed => RejectionReason::MalformedSubmissionToken,
            TimingOutcome::Missing => RejectionReason::MissingSubmissionToken,
        };

        if self.policy.reject_malformed_timing_token {
            return Err(reason);
        }

        warn!(
            route = %attempt.route,
            identity = %attempt.identity,
            reason = %reason,
            "Unusable submission token, letting submission through"
        );
        Ok(())
    }

    /// Remove every control field the client embedded.
    fn strip(&self, mut fields: Map<String, Value>) -> Map<String, Value> {
        fields.retain(|name, _| !self.stripped.contains(name));
        fields
    }
}
