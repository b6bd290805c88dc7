// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission timing gate.
//!
//! The form records `Date.now()` when it renders and sends it back base64
//! encoded. Scripted submitters post within milliseconds of loading the
//! page; people need a few seconds to type a message. The token is not
//! signed, so this is a heuristic, not proof.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Outcome of a timing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingOutcome {
    /// Elapsed time is plausible
    Passed { elapsed_ms: i64 },
    /// Submitted faster than the configured minimum (or from the future)
    TooFast { elapsed_ms: i64 },
    /// Token present but not a base64-encoded millisecond timestamp
    Malformed,
    /// No token supplied
    Missing,
}

impl TimingOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// Checks elapsed time between form render and submission.
#[derive(Debug, Clone)]
pub struct TimingGate {
    min_elapsed_ms: i64,
}

impl TimingGate {
    pub fn new(min_elapsed_ms: u64) -> Self {
        Self {
            min_elapsed_ms: i64::try_from(min_elapsed_ms).unwrap_or(i64::MAX),
        }
    }

    /// Evaluate `token` against the clock reading `now_ms`.
    pub fn check(&self, token: Option<&str>, now_ms: i64) -> TimingOutcome {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return TimingOutcome::Missing,
        };

        let rendered_at = match decode_submission_token(token) {
            Some(ms) => ms,
            None => return TimingOutcome::Malformed,
        };

        let elapsed_ms = now_ms.saturating_sub(rendered_at);
        if elapsed_ms < self.min_elapsed_ms {
            TimingOutcome::TooFast { elapsed_ms }
        } else {
            TimingOutcome::Passed { elapsed_ms }
        }
    }
}

/// Decode a submission token into epoch milliseconds.
pub fn decode_submission_token(token: &str) -> Option<i64> {
    let bytes = STANDARD.decode(token.trim()).ok()?;
    let text = std::str::from_utf8(&bytes).ok()?;
    let ms: i64 = text.trim().parse().ok()?;
    (ms > 0).then_some(ms)
}

/// Encode epoch milliseconds the way the frontend does.
pub fn encode_submission_token(rendered_at_ms: i64) -> String {
    STANDARD.encode(rendered_at_ms.to_string())
}
