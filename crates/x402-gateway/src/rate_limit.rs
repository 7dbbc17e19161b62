//! Sliding-window admission control keyed by (route tier, client IP).
//!
//! Counters live in an external store so multiple instances share one
//! budget; [`CounterStore`] abstracts the backend. When no store is
//! configured or the store is unreachable, checks degrade to an explicit
//! [`Decision::Bypass`]: the demo stays available, and the bypass is
//! visible in logs, metrics and `/health`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::HttpRequest;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::error::GatewayError;
use crate::metrics::{RATE_LIMIT_DECISIONS, REQUESTS};

/// Key prefix shared by every tier, versioned per deployment.
const PREFIX: &str = "x402-base-sepolia:rl";

/// Route tiers. Everything not listed falls back to [`DEFAULT_TIER`].
const TIERS: &[Tier] = &[
    Tier {
        route: "/api/cowsays",
        name: "cowsays",
        limit: 10,
        window_secs: 60,
    },
    Tier {
        route: "/api/events",
        name: "events",
        limit: 5,
        window_secs: 60,
    },
];

const DEFAULT_TIER: Tier = Tier {
    route: "",
    name: "default",
    limit: 30,
    window_secs: 60,
};

#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub route: &'static str,
    pub name: &'static str,
    pub limit: u64,
    pub window_secs: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unreachable: {0}")]
    Unreachable(String),

    #[error("counter store protocol error: {0}")]
    Protocol(String),
}

/// Counter values a sliding check consults: the window being filled and the
/// one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounts {
    pub current: u64,
    pub previous: u64,
}

/// Backend for the sliding-window counters. One operation: bump the current
/// window (creating it with an expiry) and read the previous window, in a
/// single round trip.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(
        &self,
        current_key: &str,
        previous_key: &str,
        ttl: Duration,
    ) -> Result<WindowCounts, StoreError>;
}

/// In-process counter store backed by DashMap. Single-instance deployments
/// and tests; counters are lost on restart.
pub struct MemoryCounterStore {
    counters: DashMap<String, (u64, Instant)>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Drop expired windows. Returns the number purged.
    pub fn purge_expired(&self) -> usize {
        let before = self.counters.len();
        let now = Instant::now();
        self.counters.retain(|_, (_, expires)| *expires > now);
        before - self.counters.len()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        current_key: &str,
        previous_key: &str,
        ttl: Duration,
    ) -> Result<WindowCounts, StoreError> {
        if self.counters.len() > 4096 {
            self.purge_expired();
        }

        let now = Instant::now();
        let current = {
            let mut slot = self
                .counters
                .entry(current_key.to_string())
                .or_insert((0, now + ttl));
            if slot.value().1 <= now {
                *slot.value_mut() = (0, now + ttl);
            }
            slot.value_mut().0 += 1;
            slot.value().0
        };

        let previous = self
            .counters
            .get(previous_key)
            .filter(|slot| slot.value().1 > now)
            .map(|slot| slot.value().0)
            .unwrap_or(0);

        Ok(WindowCounts { current, previous })
    }
}

/// Upstash-style Redis REST backend: one `/pipeline` call carrying
/// `INCR` + `EXPIRE NX` + `GET`.
pub struct RestCounterStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestCounterStore {
    pub fn new(base_url: &str, token: &str) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl CounterStore for RestCounterStore {
    async fn hit(
        &self,
        current_key: &str,
        previous_key: &str,
        ttl: Duration,
    ) -> Result<WindowCounts, StoreError> {
        let commands = serde_json::json!([
            ["INCR", current_key],
            ["EXPIRE", current_key, ttl.as_secs(), "NX"],
            ["GET", previous_key],
        ]);

        let response = self
            .http
            .post(format!("{}/pipeline", self.base_url))
            .bearer_auth(&self.token)
            .json(&commands)
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Protocol(format!("pipeline returned {status}")));
        }

        let results: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(format!("pipeline response parse failed: {e}")))?;

        let current = results
            .first()
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| StoreError::Protocol("missing INCR result".to_string()))?;

        // GET returns the counter as a string, or null for a missing key.
        let previous = results
            .get(2)
            .and_then(|v| v.get("result"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.parse().unwrap_or(0),
                serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
                _ => 0,
            })
            .unwrap_or(0);

        Ok(WindowCounts { current, previous })
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Over limit; retry after the given number of seconds.
    Deny { retry_after: u64 },
    /// Admitted without counting; the limiter is off or its store failed.
    Bypass(BypassReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    Disabled,
    StoreError,
}

/// What backs the limiter; surfaced in `/health` for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterMode {
    Rest,
    Memory,
    Disabled,
}

pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
    mode: LimiterMode,
    tiers: &'static [Tier],
    default_tier: Tier,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, mode: LimiterMode) -> Self {
        Self {
            store: Some(store),
            mode,
            tiers: TIERS,
            default_tier: DEFAULT_TIER,
        }
    }

    /// Custom tier table, for tests and non-default deployments.
    pub fn with_tiers(
        store: Arc<dyn CounterStore>,
        mode: LimiterMode,
        tiers: &'static [Tier],
        default_tier: Tier,
    ) -> Self {
        Self {
            store: Some(store),
            mode,
            tiers,
            default_tier,
        }
    }

    /// A limiter that admits everything, observably.
    pub fn disabled() -> Self {
        Self {
            store: None,
            mode: LimiterMode::Disabled,
            tiers: TIERS,
            default_tier: DEFAULT_TIER,
        }
    }

    pub fn mode(&self) -> LimiterMode {
        self.mode
    }

    pub fn mode_label(&self) -> &'static str {
        match self.mode {
            LimiterMode::Rest => "rest",
            LimiterMode::Memory => "memory",
            LimiterMode::Disabled => "disabled",
        }
    }

    fn tier_for(&self, route: &str) -> &Tier {
        self.tiers
            .iter()
            .find(|t| t.route == route)
            .unwrap_or(&self.default_tier)
    }

    /// Sliding-window check: within any trailing window, at most `limit`
    /// admits per (tier, client key). The previous window's count is
    /// weighted by its unelapsed fraction, so the window slides instead of
    /// resetting on calendar boundaries.
    pub async fn check(&self, client_key: &str, route: &str) -> Decision {
        let Some(store) = &self.store else {
            return Decision::Bypass(BypassReason::Disabled);
        };

        let tier = self.tier_for(route);
        let window_ms = tier.window_secs * 1000;
        let now_ms = unix_millis();
        let window = now_ms / window_ms;

        let key = |w: u64| format!("{PREFIX}:{}:{client_key}:{w}", tier.name);
        // Keep counters around long enough for the next window's read.
        let ttl = Duration::from_secs(tier.window_secs * 2);

        let counts = match store
            .hit(&key(window), &key(window.saturating_sub(1)), ttl)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(error = %e, tier = tier.name, "counter store failed, admitting without limit");
                return Decision::Bypass(BypassReason::StoreError);
            }
        };

        let elapsed = (now_ms % window_ms) as f64 / window_ms as f64;
        let weighted = counts.previous as f64 * (1.0 - elapsed) + counts.current as f64;

        if weighted > tier.limit as f64 {
            let reset_ms = (window + 1) * window_ms;
            let retry_after = (reset_ms.saturating_sub(now_ms)).div_ceil(1000).max(1);
            Decision::Deny { retry_after }
        } else {
            Decision::Allow
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Client key: first `x-forwarded-for` entry, else the peer address.
pub fn client_key(req: &HttpRequest) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| req.peer_addr().map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Admission check for one request, evaluated before any protocol or
/// facilitator work. Denials become [`GatewayError::RateLimited`]; both
/// bypass reasons admit.
pub async fn enforce(
    req: &HttpRequest,
    route: &str,
    limiter: &RateLimiter,
) -> Result<(), GatewayError> {
    let key = client_key(req);
    match limiter.check(&key, route).await {
        Decision::Allow => {
            RATE_LIMIT_DECISIONS.with_label_values(&[route, "allow"]).inc();
            Ok(())
        }
        Decision::Bypass(reason) => {
            tracing::debug!(?reason, route, "rate limit bypassed");
            RATE_LIMIT_DECISIONS
                .with_label_values(&[route, "bypass"])
                .inc();
            Ok(())
        }
        Decision::Deny { retry_after } => {
            tracing::debug!(client = %key, route, retry_after, "rate limited");
            RATE_LIMIT_DECISIONS.with_label_values(&[route, "deny"]).inc();
            REQUESTS.with_label_values(&[route, "429"]).inc();
            Err(GatewayError::RateLimited { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn hit(&self, _: &str, _: &str, _: Duration) -> Result<WindowCounts, StoreError> {
            Err(StoreError::Unreachable("connection refused".to_string()))
        }
    }

    fn memory_limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), LimiterMode::Memory)
    }

    #[tokio::test]
    async fn test_eleventh_hit_denied_within_window() {
        let limiter = memory_limiter();
        for _ in 0..10 {
            assert_eq!(limiter.check("1.2.3.4", "/api/cowsays").await, Decision::Allow);
        }
        match limiter.check("1.2.3.4", "/api/cowsays").await {
            Decision::Deny { retry_after } => assert!(retry_after >= 1),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clients_counted_independently() {
        let limiter = memory_limiter();
        for _ in 0..10 {
            assert_eq!(limiter.check("1.2.3.4", "/api/cowsays").await, Decision::Allow);
        }
        assert_eq!(limiter.check("5.6.7.8", "/api/cowsays").await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_routes_use_separate_tiers() {
        let limiter = memory_limiter();
        for _ in 0..5 {
            assert_eq!(limiter.check("1.2.3.4", "/api/events").await, Decision::Allow);
        }
        assert!(matches!(
            limiter.check("1.2.3.4", "/api/events").await,
            Decision::Deny { .. }
        ));
        // The same client still has budget on the default tier.
        assert_eq!(limiter.check("1.2.3.4", "/other").await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_admission_resumes_after_window() {
        static SMALL: &[Tier] = &[Tier {
            route: "/t",
            name: "t",
            limit: 2,
            window_secs: 1,
        }];
        let limiter = RateLimiter::with_tiers(
            Arc::new(MemoryCounterStore::new()),
            LimiterMode::Memory,
            SMALL,
            DEFAULT_TIER,
        );

        assert_eq!(limiter.check("k", "/t").await, Decision::Allow);
        assert_eq!(limiter.check("k", "/t").await, Decision::Allow);
        assert!(matches!(limiter.check("k", "/t").await, Decision::Deny { .. }));

        // Two full windows later the old counts no longer weigh in.
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(limiter.check("k", "/t").await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_disabled_limiter_bypasses() {
        let limiter = RateLimiter::disabled();
        for _ in 0..100 {
            assert_eq!(
                limiter.check("1.2.3.4", "/api/cowsays").await,
                Decision::Bypass(BypassReason::Disabled)
            );
        }
        assert_eq!(limiter.mode(), LimiterMode::Disabled);
    }

    #[tokio::test]
    async fn test_store_failure_bypasses() {
        let limiter = RateLimiter::new(Arc::new(FailingStore), LimiterMode::Rest);
        assert_eq!(
            limiter.check("1.2.3.4", "/api/cowsays").await,
            Decision::Bypass(BypassReason::StoreError)
        );
    }

    #[tokio::test]
    async fn test_memory_store_expires_counters() {
        let store = MemoryCounterStore::new();
        let counts = store.hit("a:1", "a:0", Duration::from_millis(50)).await.unwrap();
        assert_eq!(counts, WindowCounts { current: 1, previous: 0 });

        tokio::time::sleep(Duration::from_millis(80)).await;
        // Expired slot restarts from zero.
        let counts = store.hit("a:1", "a:0", Duration::from_millis(50)).await.unwrap();
        assert_eq!(counts.current, 1);
    }
}
