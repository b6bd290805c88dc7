// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics.

use crate::pipeline::RouteClass;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Service metrics, registered in a private registry.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    verification_failures: IntCounter,
    verification_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "submission_guard_requests_total",
                "Public write requests by route class and outcome",
            ),
            &["route", "outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let verification_failures = IntCounter::new(
            "submission_guard_verification_failures_total",
            "Calls to the challenge verification service that failed or timed out",
        )?;
        registry.register(Box::new(verification_failures.clone()))?;

        let verification_duration = Histogram::with_opts(
            HistogramOpts::new(
                "submission_guard_verification_duration_seconds",
                "Round-trip time of challenge verification calls",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(verification_duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            verification_failures,
            verification_duration,
        })
    }

    /// Count a finished request.
    pub fn record_request(&self, route: RouteClass, outcome: &str) {
        self.requests
            .with_label_values(&[route.as_str(), outcome])
            .inc();
    }

    pub fn request_count(&self, route: RouteClass, outcome: &str) -> u64 {
        self.requests
            .with_label_values(&[route.as_str(), outcome])
            .get()
    }

    pub fn record_verification_failure(&self) {
        self.verification_failures.inc();
    }

    pub fn verification_failures(&self) -> u64 {
        self.verification_failures.get()
    }

    pub fn observe_verification(&self, elapsed: Duration) {
        self.verification_duration.observe(elapsed.as_secs_f64());
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
