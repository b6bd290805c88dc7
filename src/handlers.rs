// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the public write routes.
//!
//! Every route runs the same front half: resolve the visitor, charge the
//! route's quota, then screen the payload. Only what happens to an accepted
//! payload differs.

use crate::collaborators::{ChatError, ChatResponder, ContentSink, SinkError};
use crate::config::Config;
use crate::error::{
    ceil_secs, StartupError, SubmissionError, RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET,
};
use crate::identity::{network_address, IdentityKey, IdentityResolver};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::metrics::Metrics;
use crate::pipeline::{PipelineOutcome, RouteClass, SubmissionAttempt, SubmissionPipeline};
use crate::verification::{ChallengeVerifier, TurnstileVerifier, VerificationGate};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: IdentityResolver,
    pub limiter: RateLimiter,
    pub pipeline: SubmissionPipeline,
    pub content: Arc<dyn ContentSink>,
    pub chat: Arc<dyn ChatResponder>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble state from configuration, using Turnstile for verification.
    pub fn from_config(
        config: Config,
        content: Arc<dyn ContentSink>,
        chat: Arc<dyn ChatResponder>,
    ) -> Result<Self, StartupError> {
        let verifier = TurnstileVerifier::from_config(&config.verification)?
            .map(|v| Arc::new(v) as Arc<dyn ChallengeVerifier>);
        Self::with_verifier(config, verifier, content, chat)
    }

    /// Assemble state around an explicit verifier.
    pub fn with_verifier(
        config: Config,
        verifier: Option<Arc<dyn ChallengeVerifier>>,
        content: Arc<dyn ContentSink>,
        chat: Arc<dyn ChatResponder>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let metrics = Arc::new(Metrics::new()?);
        let gate = VerificationGate::new(verifier, config.security_policy()).with_metrics(metrics.clone());

        Ok(Self {
            identity: IdentityResolver::new(
                config.fields.client_id.clone(),
                config.fields.client_id_header.clone(),
            ),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            pipeline: SubmissionPipeline::from_config(&config, gate),
            content,
            chat,
            metrics,
            config,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
}

/// Chat reply body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// A request that passed identity resolution and the rate limiter.
struct Admitted {
    identity: IdentityKey,
    addr: Option<IpAddr>,
    fields: Map<String, Value>,
    quota: RateLimitResult,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/messages", post(submit_contact))
        .route("/api/testimonials", post(submit_testimonial))
        .route("/api/chat", post(chat));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router.with_state(state)
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "submission-guard",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.to_string(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => SubmissionError::Internal(format!("metrics rendering failed: {e}")).into_response(),
    }
}

/// `POST /api/messages`
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let result = create_content(&state, RouteClass::Contact, peer, &headers, &body).await;
    finish(&state, RouteClass::Contact, result)
}

/// `POST /api/testimonials`
pub async fn submit_testimonial(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let result = create_content(&state, RouteClass::Testimonial, peer, &headers, &body).await;
    finish(&state, RouteClass::Testimonial, result)
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let result = answer_chat(&state, peer, &headers, &body).await;
    finish(&state, RouteClass::Chat, result)
}

async fn create_content(
    state: &AppState,
    route: RouteClass,
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, SubmissionError> {
    let admitted = admit(state, route, peer, headers, body).await?;
    let quota = admitted.quota.clone();
    let cleaned = screen(state, route, admitted).await?;

    let record = state.content.create(route, cleaned).await.map_err(|e| match e {
        SinkError::Invalid(message) => SubmissionError::ContentRejected(message),
        SinkError::Backend(detail) => SubmissionError::Internal(detail),
    })?;

    Ok(with_quota_headers(
        (StatusCode::CREATED, Json(record)).into_response(),
        &quota,
    ))
}

async fn answer_chat(
    state: &AppState,
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, SubmissionError> {
    let admitted = admit(state, RouteClass::Chat, peer, headers, body).await?;
    let quota = admitted.quota.clone();

    let message = admitted
        .fields
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SubmissionError::ContentRejected("Message is required".to_string()))?;

    screen(state, RouteClass::Chat, admitted).await?;

    let reply = state.chat.reply(&message).await.map_err(|e| {
        match &e {
            ChatError::Disabled => debug!("Chat requested but no responder is configured"),
            _ => error!(error = %e, "Chat responder failed"),
        }
        SubmissionError::ChatUnavailable
    })?;

    Ok(with_quota_headers(
        Json(ChatResponse { reply }).into_response(),
        &quota,
    ))
}

/// Parse the body, resolve the visitor and charge the route's quota.
async fn admit(
    state: &AppState,
    route: RouteClass,
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Admitted, SubmissionError> {
    let addr = network_address(headers, peer, state.config.server.trust_forwarded_for);
    let fields = parse_body(body)?;
    let identity = state.identity.resolve(&fields, headers, addr);

    let quota = state.limiter.check(route, &identity).await;
    if let RateLimitResult::Limited { limit, retry_after } = quota {
        info!(
            %route,
            %identity,
            retry_after_secs = ceil_secs(retry_after),
            "Request rate limited"
        );
        return Err(SubmissionError::QuotaExceeded { limit, retry_after });
    }

    Ok(Admitted {
        identity,
        addr,
        fields,
        quota,
    })
}

/// Run the submission pipeline over an admitted request.
async fn screen(
    state: &AppState,
    route: RouteClass,
    admitted: Admitted,
) -> Result<Map<String, Value>, SubmissionError> {
    let attempt = SubmissionAttempt::from_payload(
        route,
        admitted.identity,
        admitted.fields,
        admitted.addr,
        state.pipeline.field_names(),
    );

    match state.pipeline.process(attempt).await {
        PipelineOutcome::Accepted(cleaned) => Ok(cleaned),
        PipelineOutcome::Rejected(reason) => Err(reason.into_error()),
    }
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>, SubmissionError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => {
            debug!(len = body.len(), "Request body is not a JSON object");
            Err(SubmissionError::MalformedPayload)
        }
    }
}

fn finish(state: &AppState, route: RouteClass, result: Result<Response, SubmissionError>) -> Response {
    match result {
        Ok(response) => {
            state.metrics.record_request(route, "accepted");
            response
        }
        Err(error) => {
            state.metrics.record_request(route, error.label());
            error.into_response()
        }
    }
}

fn with_quota_headers(mut response: Response, quota: &RateLimitResult) -> Response {
    if let RateLimitResult::Allowed {
        limit,
        remaining,
        reset_in,
    } = quota
    {
        let headers = response.headers_mut();
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(*limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(*remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(*reset_in)));
    }
    response
}
