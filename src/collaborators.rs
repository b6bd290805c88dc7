// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Collaborators that receive accepted submissions.
//!
//! Content persistence and answer generation live outside this service;
//! these traits are the seams it hands cleaned payloads across.

use crate::pipeline::RouteClass;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Content creation failures.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Payload failed content validation; message is shown to the caller
    #[error("{0}")]
    Invalid(String),

    #[error("content store failure: {0}")]
    Backend(String),
}

/// Creates content records from accepted submissions.
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn create(&self, route: RouteClass, payload: Map<String, Value>) -> Result<Value, SinkError>;
}

/// Chat answer failures.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat responder is not configured")]
    Disabled,

    #[error("chat upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("chat upstream returned HTTP {0}")]
    Status(u16),
}

/// Produces assistant replies for accepted chat messages.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn reply(&self, message: &str) -> Result<String, ChatError>;
}

/// Field rules for one content type.
struct Schema {
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

const CONTACT_SCHEMA: Schema = Schema {
    required: &["name", "email", "message"],
    optional: &["subject"],
};

const TESTIMONIAL_SCHEMA: Schema = Schema {
    required: &["author", "contentEn", "contentFr"],
    optional: &["role"],
};

fn schema_for(route: RouteClass) -> Option<&'static Schema> {
    match route {
        RouteClass::Contact => Some(&CONTACT_SCHEMA),
        RouteClass::Testimonial => Some(&TESTIMONIAL_SCHEMA),
        RouteClass::Chat => None,
    }
}

/// Record kept by [`InMemoryContentSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub route: RouteClass,
    pub record: Value,
}

/// Process-local content store.
///
/// Keeps only the fields the content type declares, and never lets a
/// visitor pre-approve a testimonial or pre-read a message.
#[derive(Debug, Default)]
pub struct InMemoryContentSink {
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryContentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records created for `route`, oldest first.
    pub async fn records(&self, route: RouteClass) -> Vec<Value> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.route == route)
            .map(|r| r.record.clone())
            .collect()
    }
}

#[async_trait]
impl ContentSink for InMemoryContentSink {
    async fn create(&self, route: RouteClass, payload: Map<String, Value>) -> Result<Value, SinkError> {
        let schema = schema_for(route)
            .ok_or_else(|| SinkError::Backend(format!("{route} submissions are not stored")))?;

        let mut record = Map::new();
        for &name in schema.required {
            match payload.get(name).and_then(Value::as_str).map(str::trim) {
                Some(v) if !v.is_empty() => {
                    record.insert(name.to_string(), Value::String(v.to_string()));
                }
                _ => return Err(SinkError::Invalid(format!("{name} is required"))),
            }
        }
        for &name in schema.optional {
            if let Some(v) = payload.get(name).and_then(Value::as_str) {
                record.insert(name.to_string(), Value::String(v.trim().to_string()));
            }
        }

        record.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        record.insert(
            "createdAt".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        match route {
            RouteClass::Contact => {
                record.insert("read".to_string(), Value::Bool(false));
            }
            RouteClass::Testimonial => {
                record.insert("approved".to_string(), Value::Bool(false));
            }
            RouteClass::Chat => {}
        }

        let record = Value::Object(record);
        self.records.write().await.push(StoredRecord {
            route,
            record: record.clone(),
        });
        debug!(%route, "Stored submission");
        Ok(record)
    }
}

/// Chat responder used when no upstream is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledChatResponder;

#[async_trait]
impl ChatResponder for DisabledChatResponder {
    async fn reply(&self, _message: &str) -> Result<String, ChatError> {
        Err(ChatError::Disabled)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    reply: String,
}

/// Forwards accepted chat messages to the answer-generation service.
pub struct UpstreamChatResponder {
    client: reqwest::Client,
    url: String,
}

impl UpstreamChatResponder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChatResponder for UpstreamChatResponder {
    async fn reply(&self, message: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status().as_u16()));
        }

        let body: ChatReply = response.json().await?;
        Ok(body.reply)
    }
}
