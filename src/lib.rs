// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission Guard
//!
//! Anti-abuse gate for the public write endpoints of the portfolio site
//! (contact messages, testimonials, AI chat):
//!
//! - Per-visitor identity from a browser-persisted identifier or address
//! - Fixed-window quotas per route class (3/hour contact and testimonial,
//!   15 per 15 minutes chat)
//! - Honeypot field detection
//! - Disposable email domain filtering
//! - Cloudflare Turnstile verification with an environment-driven
//!   fail-open/fail-closed policy
//! - Submission timing gate
//! - Control-field stripping before content is handed on

pub mod collaborators;
pub mod config;
pub mod disposable;
pub mod error;
pub mod handlers;
pub mod honeypot;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod timing;
pub mod verification;

pub use config::Config;
pub use error::SubmissionError;
pub use limiter::{RateLimitResult, RateLimiter};
pub use pipeline::{PipelineOutcome, RouteClass, SubmissionAttempt, SubmissionPipeline};
pub use policy::{Environment, SecurityPolicy};
pub use verification::{VerificationOutcome, VerificationReason};
