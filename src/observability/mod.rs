//! Observability module providing logging and counters.

use crate::errors::RateLimitInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Counters for page fetches and client construction.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Metadata fetches issued by docs pages.
    fetches_issued: AtomicU64,
    /// Fetch results applied to page or reader state.
    fetches_applied: AtomicU64,
    /// Fetch results discarded as stale.
    fetches_discarded: AtomicU64,
    /// GitHub clients constructed.
    clients_constructed: AtomicU64,
    /// GitHub client requests served from the memo cache.
    client_cache_hits: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issued fetch.
    pub fn record_fetch_issued(&self) {
        self.fetches_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an applied fetch result.
    pub fn record_fetch_applied(&self) {
        self.fetches_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a discarded fetch result.
    pub fn record_fetch_discarded(&self) {
        self.fetches_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a client construction.
    pub fn record_client_constructed(&self) {
        self.clients_constructed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a memo cache hit.
    pub fn record_client_cache_hit(&self) {
        self.client_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            fetches_applied: self.fetches_applied.load(Ordering::Relaxed),
            fetches_discarded: self.fetches_discarded.load(Ordering::Relaxed),
            clients_constructed: self.clients_constructed.load(Ordering::Relaxed),
            client_cache_hits: self.client_cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics.
    pub fn reset(&self) {
        self.fetches_issued.store(0, Ordering::Relaxed);
        self.fetches_applied.store(0, Ordering::Relaxed);
        self.fetches_discarded.store(0, Ordering::Relaxed);
        self.clients_constructed.store(0, Ordering::Relaxed);
        self.client_cache_hits.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Metadata fetches issued.
    pub fetches_issued: u64,
    /// Fetch results applied.
    pub fetches_applied: u64,
    /// Fetch results discarded as stale.
    pub fetches_discarded: u64,
    /// GitHub clients constructed.
    pub clients_constructed: u64,
    /// Memo cache hits.
    pub client_cache_hits: u64,
}

/// Tracing hooks for transport and page events.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of an HTTP request.
    #[instrument(skip(method, url))]
    pub fn on_request_start(method: &str, url: &str) {
        debug!(method = %method, url = %url, "HTTP request started");
    }

    /// Logs the completion of an HTTP request.
    #[instrument(skip(method, url, status, duration))]
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        debug!(
            method = %method,
            url = %url,
            status = status,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Logs a request error.
    #[instrument(skip(method, url, error))]
    pub fn on_request_error(method: &str, url: &str, error: &str) {
        error!(method = %method, url = %url, error = %error, "HTTP request failed");
    }

    /// Logs rate limit info.
    #[instrument(skip(info))]
    pub fn on_rate_limit_update(info: &RateLimitInfo) {
        debug!(
            limit = info.limit,
            remaining = info.remaining,
            reset_at = %info.reset_at,
            resource = info.resource.as_deref().unwrap_or("core"),
            "Rate limit updated"
        );
    }

    /// Logs rate limit exceeded.
    #[instrument(skip(info))]
    pub fn on_rate_limit_exceeded(info: &RateLimitInfo) {
        warn!(
            limit = info.limit,
            remaining = info.remaining,
            reset_at = %info.reset_at,
            resource = info.resource.as_deref().unwrap_or("core"),
            "Rate limit exceeded"
        );
    }

    /// Logs a fetch result dropped because a newer request superseded it.
    pub fn on_stale_discarded(stream: &str, entity: &str) {
        debug!(stream = %stream, entity = %entity, "Discarding superseded fetch result");
    }

    /// Logs a page mount.
    pub fn on_page_mounted(entity: &str, page_id: &str) {
        info!(entity = %entity, page_id = %page_id, "Docs page mounted");
    }

    /// Logs construction of a GitHub client.
    pub fn on_client_constructed(transport: &str, target: &str, scopes: &str) {
        info!(
            transport = %transport,
            client_for = %target,
            scopes = %scopes,
            "Constructing GitHub client"
        );
    }
}

/// Sensitive headers that should be redacted in logs.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-github-token",
    "x-access-token",
    "cookie",
    "set-cookie",
];

/// Redacts sensitive values in headers.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        metrics.record_fetch_issued();
        metrics.record_fetch_issued();
        metrics.record_fetch_applied();
        metrics.record_fetch_discarded();
        metrics.record_client_constructed();
        metrics.record_client_cache_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetches_issued, 2);
        assert_eq!(snapshot.fetches_applied, 1);
        assert_eq!(snapshot.fetches_discarded, 1);
        assert_eq!(snapshot.clients_constructed, 1);
        assert_eq!(snapshot.client_cache_hits, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "Bearer token"), "[REDACTED]");
        assert_eq!(redact_header("Content-Type", "application/json"), "application/json");
    }
}
