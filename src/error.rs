// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Caller-facing errors.
//!
//! Messages are deliberately generic: a rejected visitor learns which
//! category failed, never which heuristic tripped.

use crate::config::ConfigError;
use crate::verification::VerifierError;
use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Errors returned to callers of the public write routes.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Quota reached. Please try again later.")]
    QuotaExceeded { limit: u32, retry_after: Duration },

    #[error("Verification failed. Please try again.")]
    ValidationRejected,

    #[error("Verification is temporarily unavailable. Please try again later.")]
    ExternalServiceUnavailable,

    #[error("Malformed request body")]
    MalformedPayload,

    #[error("{0}")]
    ContentRejected(String),

    #[error("Assistant is temporarily unavailable.")]
    ChatUnavailable,

    /// Detail is logged, never returned.
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl SubmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationRejected | Self::MalformedPayload | Self::ContentRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ExternalServiceUnavailable | Self::ChatUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "RATE_LIMITED",
            Self::ValidationRejected => "VERIFICATION_FAILED",
            Self::ExternalServiceUnavailable => "VERIFICATION_UNAVAILABLE",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::ContentRejected(_) => "INVALID_CONTENT",
            Self::ChatUnavailable => "CHAT_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Metrics label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "rate_limited",
            Self::ValidationRejected => "rejected",
            Self::ExternalServiceUnavailable => "verification_unavailable",
            Self::MalformedPayload => "malformed_payload",
            Self::ContentRejected(_) => "content_rejected",
            Self::ChatUnavailable => "chat_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(detail = %detail, "Internal error while handling submission");
        }

        let status = self.status();
        let retry_after_secs = match &self {
            Self::QuotaExceeded { retry_after, .. } => Some(ceil_secs(*retry_after)),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::QuotaExceeded { limit, retry_after } = self {
            let secs = ceil_secs(retry_after);
            let headers = response.headers_mut();
            headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
            headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATELIMIT_REMAINING, HeaderValue::from(0u32));
            headers.insert(RATELIMIT_RESET, HeaderValue::from(secs));
        }
        response
    }
}

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Whole seconds, rounded up so clients never retry early.
pub fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Failures while assembling the service.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("verification client: {0}")]
    Verifier(#[from] VerifierError),
}
