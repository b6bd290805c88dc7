// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter for the public write routes.
//!
//! Each route class keeps an independent quota per visitor identity. Hits
//! beyond the quota are rejected without being counted, so a bucket never
//! holds more than `max` hits.
//!
//! Bucket state lives behind [`RateLimitStore`] so a shared cache can replace
//! the in-process map in multi-instance deployments.

use crate::config::{RateLimitConfig, RouteLimit};
use crate::identity::IdentityKey;
use crate::pipeline::RouteClass;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Quota for the window
        limit: u32,
        /// Remaining requests in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Quota for the window
        limit: u32,
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Bucket key: one counter per route class and identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub route: RouteClass,
    pub identity: IdentityKey,
}

/// State of a bucket after a hit was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Hits counted in the current window
    pub count: u32,
    /// Whether this hit was admitted
    pub admitted: bool,
    /// Time until the current window ends
    pub reset_in: Duration,
}

/// Storage for fixed-window counters.
///
/// Implementations must apply `hit` atomically per key: two concurrent hits
/// on the same key must never both observe `count < max` when only one slot
/// is left.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count a hit against `key` unless the window is already full.
    async fn hit(&self, key: &BucketKey, limit: RouteLimit) -> WindowState;

    /// Drop buckets whose window has ended. Returns the number removed.
    async fn purge_expired(&self) -> usize;

    /// Number of live buckets.
    async fn len(&self) -> usize;
}

/// Fixed-window counter.
#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    window: Duration,
    count: u32,
}

impl Bucket {
    fn new(window: Duration, now: Instant) -> Self {
        Self {
            window_start: now,
            window,
            count: 0,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }

    fn try_hit(&mut self, limit: RouteLimit, now: Instant) -> WindowState {
        self.window = limit.window();
        if self.is_expired(now) {
            self.window_start = now;
            self.count = 0;
        }

        let admitted = self.count < limit.max;
        if admitted {
            self.count += 1;
        }

        WindowState {
            count: self.count,
            admitted,
            reset_in: self.window.saturating_sub(now.duration_since(self.window_start)),
        }
    }
}

/// In-process store.
///
/// The map lock is only held to look up or insert a bucket handle; each
/// bucket has its own lock, so different identities never wait on each other.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: RwLock<HashMap<BucketKey, Arc<Mutex<Bucket>>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn bucket(&self, key: &BucketKey, window: Duration) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write().await;
        buckets
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(window, Instant::now()))))
            .clone()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &BucketKey, limit: RouteLimit) -> WindowState {
        let bucket = self.bucket(key, limit.window()).await;
        let mut bucket = bucket.lock().await;
        bucket.try_hit(limit, Instant::now())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();

        // A handle held elsewhere belongs to an in-flight hit; removing it
        // would let the next hit start a fresh window and lose that count.
        buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Ok(b) => !b.is_expired(now),
                Err(_) => true,
            }
        });

        before - buckets.len()
    }

    async fn len(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Per-route fixed-window rate limiter.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Create a rate limiter backed by a fresh in-memory store.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryRateLimitStore::new()))
    }

    /// Create a rate limiter over an existing store.
    pub fn with_store(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and consume one slot of the route's quota for `identity`.
    pub async fn check(&self, route: RouteClass, identity: &IdentityKey) -> RateLimitResult {
        let limit = self.config.for_route(route);
        let key = BucketKey {
            route,
            identity: identity.clone(),
        };

        let state = self.store.hit(&key, limit).await;

        if state.admitted {
            RateLimitResult::Allowed {
                limit: limit.max,
                remaining: limit.max - state.count,
                reset_in: state.reset_in,
            }
        } else {
            debug!(%route, %identity, retry_after = ?state.reset_in, "Rate limit exceeded");
            RateLimitResult::Limited {
                limit: limit.max,
                retry_after: state.reset_in,
            }
        }
    }

    /// Clean up expired buckets (should be called periodically).
    pub async fn cleanup(&self) -> usize {
        let removed = self.store.purge_expired().await;
        if removed > 0 {
            debug!(removed, "Purged expired rate limit buckets");
        }
        removed
    }

    /// Number of live buckets.
    pub async fn tracked(&self) -> usize {
        self.store.len().await
    }
}
