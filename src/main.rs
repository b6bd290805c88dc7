// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission Guard Service
//!
//! Serves the public write routes of the portfolio site and screens every
//! request before it reaches content storage or the chat assistant:
//!
//! - `POST /api/messages`: contact form
//! - `POST /api/testimonials`: testimonial form
//! - `POST /api/chat`: chat assistant
//! - `GET /health`, `GET /metrics`
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `APP_ENV`: production, staging, development or test (default: development)
//! - `TURNSTILE_SECRET_KEY`: Turnstile secret; required for verification
//! - `CONTACT_RATE_MAX`, `CHAT_RATE_WINDOW_MS`, ...: per-route quotas
//! - `MIN_SUBMIT_ELAPSED_MS`: timing gate threshold (default: 3000)
//! - `CHAT_UPSTREAM_URL`: answer-generation service for chat
//! - `CHAT_UPSTREAM_TIMEOUT_MS`: chat upstream timeout (default: 30000)

use axum::http::{header, HeaderName, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use submission_guard::{
    collaborators::{
        ChatResponder, DisabledChatResponder, InMemoryContentSink, UpstreamChatResponder,
    },
    config::Config,
    handlers::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    let policy = config.security_policy();
    info!(
        bind_addr = %config.bind_addr,
        environment = %config.environment,
        require_verification = policy.require_verification,
        fail_open = policy.fail_open_on_service_error,
        contact_max = config.rate_limit.contact.max,
        testimonial_max = config.rate_limit.testimonial.max,
        chat_max = config.rate_limit.chat.max,
        "Starting submission guard"
    );

    if config.verification.secret_key.is_none() {
        warn!("TURNSTILE_SECRET_KEY is not set; challenge tokens cannot be verified");
    }

    let chat: Arc<dyn ChatResponder> = match &config.server.chat_upstream_url {
        Some(url) => Arc::new(UpstreamChatResponder::new(
            url.clone(),
            config.server.chat_upstream_timeout(),
        )?),
        None => {
            warn!("CHAT_UPSTREAM_URL is not set; chat requests will be refused");
            Arc::new(DisabledChatResponder)
        }
    };

    let cors = cors_layer(&config)?;
    let bind_addr = config.bind_addr.clone();
    let cleanup_interval = config.rate_limit.cleanup_interval();

    let state = Arc::new(AppState::from_config(
        config,
        Arc::new(InMemoryContentSink::new()),
        chat,
    )?);

    // Spawn cleanup task
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            cleanup_state.limiter.cleanup().await;
        }
    });

    // Build router
    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Restrictive CORS: configured origins, JSON posts, the client id header.
fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let client_id_header = HeaderName::from_bytes(config.fields.client_id_header.as_bytes())?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, client_id_header]))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
