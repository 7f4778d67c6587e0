//! In-memory request metrics and usage-log failure tracking
//!
//! All counters live behind one mutex; snapshots copy the state out so
//! readers never hold the lock while serializing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::ErrorCategory;

/// One completed request, as observed by the endpoint layer
#[derive(Debug, Clone)]
pub struct RequestMetric {
    pub endpoint: String,
    pub duration_ms: f64,
    pub success: bool,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: Option<String>,
    pub cached: bool,
}

/// One failed usage-log write
#[derive(Debug, Clone)]
pub struct UsageLogFailure {
    pub endpoint: String,
    pub category: ErrorCategory,
    pub message: String,
    pub request_id: Option<String>,
    /// Whether the business request itself succeeded; if so, this
    /// failure is a silent visibility gap worth its own counter
    pub business_success: bool,
}

/// What a single failure recording did to the counters
#[derive(Debug, Clone, Copy)]
pub struct LogFailureOutcome {
    pub failure_count: u64,
    pub degraded_success_count: u64,
    /// True when this exact failure landed on an alert-threshold multiple
    pub alert_triggered: bool,
}

/// A retained usage-log failure sample
#[derive(Debug, Clone, Serialize)]
pub struct FailureSample {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub request_id: Option<String>,
    pub error_category: ErrorCategory,
    pub error: String,
    pub business_success: bool,
}

#[derive(Debug, Default, Clone)]
struct RollingStats {
    requests: u64,
    errors: u64,
    latency_ms_sum: f64,
    tokens_in: u64,
    tokens_out: u64,
    cached_hits: u64,
    models: HashMap<String, u64>,
}

impl RollingStats {
    fn observe(&mut self, metric: &RequestMetric) {
        self.requests += 1;
        if !metric.success {
            self.errors += 1;
        }
        if metric.cached {
            self.cached_hits += 1;
        }
        self.latency_ms_sum += metric.duration_ms;
        self.tokens_in += metric.tokens_in;
        self.tokens_out += metric.tokens_out;
        if let Some(model) = &metric.model {
            *self.models.entry(model.clone()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Default)]
struct UsageLogStats {
    failures_total: u64,
    degraded_success_total: u64,
    alert_events: u64,
    categories: HashMap<ErrorCategory, u64>,
    endpoints: HashMap<String, u64>,
    samples: VecDeque<FailureSample>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    total: RollingStats,
    endpoints: HashMap<String, RollingStats>,
    usage_log: UsageLogStats,
}

/// Shared metrics store
pub struct MetricsStore {
    inner: Mutex<MetricsInner>,
    alert_threshold: u64,
    sample_limit: usize,
}

impl MetricsStore {
    /// Create a store
    ///
    /// Zero thresholds and limits are clamped to 1.
    pub fn new(alert_threshold: u64, sample_limit: usize) -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            alert_threshold: alert_threshold.max(1),
            sample_limit: sample_limit.max(1),
        }
    }

    /// Record a completed request
    pub fn record(&self, metric: &RequestMetric) {
        let mut inner = self.lock();
        inner.total.observe(metric);
        inner
            .endpoints
            .entry(metric.endpoint.clone())
            .or_default()
            .observe(metric);
    }

    /// Record a failed usage-log write
    ///
    /// Updates the failure and degraded-success counters, per-category
    /// and per-endpoint tallies, and the bounded sample ring; fires the
    /// alert flag on exact threshold multiples.
    pub fn record_usage_log_failure(&self, failure: &UsageLogFailure) -> LogFailureOutcome {
        let mut inner = self.lock();
        let usage_log = &mut inner.usage_log;

        usage_log.failures_total += 1;
        let failure_count = usage_log.failures_total;

        if failure.business_success {
            usage_log.degraded_success_total += 1;
        }
        let degraded_success_count = usage_log.degraded_success_total;

        *usage_log.categories.entry(failure.category).or_insert(0) += 1;
        *usage_log.endpoints.entry(failure.endpoint.clone()).or_insert(0) += 1;

        usage_log.samples.push_back(FailureSample {
            timestamp: Utc::now(),
            endpoint: failure.endpoint.clone(),
            request_id: failure.request_id.clone(),
            error_category: failure.category,
            error: failure.message.clone(),
            business_success: failure.business_success,
        });
        while usage_log.samples.len() > self.sample_limit {
            usage_log.samples.pop_front();
        }

        let alert_triggered = failure_count % self.alert_threshold == 0;
        if alert_triggered {
            usage_log.alert_events += 1;
        }

        LogFailureOutcome {
            failure_count,
            degraded_success_count,
            alert_triggered,
        }
    }

    /// Copy out the current state with derived averages
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();

        let endpoints = inner
            .endpoints
            .iter()
            .map(|(endpoint, stats)| (endpoint.clone(), StatsSnapshot::from(stats)))
            .collect();

        let usage_log = &inner.usage_log;
        let usage_logging = UsageLoggingSnapshot {
            failures_total: usage_log.failures_total,
            degraded_success_total: usage_log.degraded_success_total,
            alert_threshold: self.alert_threshold,
            alert_events: usage_log.alert_events,
            error_categories: usage_log
                .categories
                .iter()
                .map(|(category, count)| (category.as_str().to_owned(), *count))
                .collect(),
            endpoints: usage_log
                .endpoints
                .iter()
                .map(|(endpoint, count)| (endpoint.clone(), *count))
                .collect(),
            samples: usage_log.samples.iter().cloned().collect(),
            alert_active: usage_log.failures_total >= self.alert_threshold,
        };

        MetricsSnapshot {
            total: StatsSnapshot::from(&inner.total),
            endpoints,
            usage_logging,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-endpoint (or total) stats with the derived average
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub latency_ms_sum: f64,
    pub latency_ms_avg: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cached_hits: u64,
    pub models: BTreeMap<String, u64>,
}

impl From<&RollingStats> for StatsSnapshot {
    fn from(stats: &RollingStats) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let latency_ms_avg = if stats.requests == 0 {
            0.0
        } else {
            stats.latency_ms_sum / stats.requests as f64
        };

        Self {
            requests: stats.requests,
            errors: stats.errors,
            latency_ms_sum: stats.latency_ms_sum,
            latency_ms_avg,
            tokens_in: stats.tokens_in,
            tokens_out: stats.tokens_out,
            cached_hits: stats.cached_hits,
            models: stats.models.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

/// Usage-log failure tracking state
#[derive(Debug, Clone, Serialize)]
pub struct UsageLoggingSnapshot {
    pub failures_total: u64,
    pub degraded_success_total: u64,
    pub alert_threshold: u64,
    pub alert_events: u64,
    pub error_categories: BTreeMap<String, u64>,
    pub endpoints: BTreeMap<String, u64>,
    pub samples: Vec<FailureSample>,
    pub alert_active: bool,
}

/// Full metrics snapshot as served by the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total: StatsSnapshot,
    pub endpoints: BTreeMap<String, StatsSnapshot>,
    pub usage_logging: UsageLoggingSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(endpoint: &str, category: ErrorCategory, request_id: &str, business_success: bool) -> UsageLogFailure {
        UsageLogFailure {
            endpoint: endpoint.to_owned(),
            category,
            message: "write failed".to_owned(),
            request_id: Some(request_id.to_owned()),
            business_success,
        }
    }

    #[test]
    fn request_metrics_accumulate_per_endpoint() {
        let store = MetricsStore::new(10, 50);

        store.record(&RequestMetric {
            endpoint: "/api/ai/summary".to_owned(),
            duration_ms: 100.0,
            success: true,
            tokens_in: 20,
            tokens_out: 30,
            model: Some("openai/gpt-4o-mini".to_owned()),
            cached: false,
        });
        store.record(&RequestMetric {
            endpoint: "/api/ai/summary".to_owned(),
            duration_ms: 300.0,
            success: false,
            tokens_in: 10,
            tokens_out: 0,
            model: Some("openai/gpt-4o-mini".to_owned()),
            cached: true,
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total.requests, 2);
        assert_eq!(snapshot.total.errors, 1);
        assert_eq!(snapshot.total.cached_hits, 1);
        assert!((snapshot.total.latency_ms_avg - 200.0).abs() < f64::EPSILON);

        let endpoint = &snapshot.endpoints["/api/ai/summary"];
        assert_eq!(endpoint.tokens_in, 30);
        assert_eq!(endpoint.models["openai/gpt-4o-mini"], 2);
    }

    #[test]
    fn alert_fires_on_exact_threshold_multiples() {
        let store = MetricsStore::new(2, 50);

        let first = store.record_usage_log_failure(&failure("/api/ai/summary", ErrorCategory::Network, "r1", true));
        let second = store.record_usage_log_failure(&failure("/api/ai/summary", ErrorCategory::Network, "r2", false));
        let third = store.record_usage_log_failure(&failure("/api/ai/tags", ErrorCategory::DbWrite, "r3", true));
        let fourth = store.record_usage_log_failure(&failure("/api/ai/tags", ErrorCategory::DbWrite, "r4", true));

        assert!(!first.alert_triggered);
        assert!(second.alert_triggered);
        assert!(!third.alert_triggered);
        assert!(fourth.alert_triggered);

        let snapshot = store.snapshot().usage_logging;
        assert_eq!(snapshot.alert_events, 2);
        assert!(snapshot.alert_active);
    }

    #[test]
    fn degraded_success_counts_only_business_successes() {
        let store = MetricsStore::new(10, 50);

        store.record_usage_log_failure(&failure("/api/ai/summary", ErrorCategory::Network, "r1", true));
        store.record_usage_log_failure(&failure("/api/ai/summary", ErrorCategory::Network, "r2", false));
        store.record_usage_log_failure(&failure("/api/ai/tags", ErrorCategory::DbWrite, "r3", true));

        let snapshot = store.snapshot().usage_logging;
        assert_eq!(snapshot.failures_total, 3);
        assert_eq!(snapshot.degraded_success_total, 2);
        assert_eq!(snapshot.error_categories["network"], 2);
        assert_eq!(snapshot.error_categories["db_write"], 1);
        assert_eq!(snapshot.endpoints["/api/ai/summary"], 2);
    }

    #[test]
    fn sample_ring_evicts_oldest_first() {
        let store = MetricsStore::new(10, 2);

        store.record_usage_log_failure(&failure("/a", ErrorCategory::Network, "r1", true));
        store.record_usage_log_failure(&failure("/b", ErrorCategory::Network, "r2", true));
        store.record_usage_log_failure(&failure("/c", ErrorCategory::Network, "r3", true));

        let samples = store.snapshot().usage_logging.samples;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].request_id.as_deref(), Some("r2"));
        assert_eq!(samples[1].request_id.as_deref(), Some("r3"));
    }

    #[test]
    fn alert_inactive_below_threshold() {
        let store = MetricsStore::new(5, 10);
        store.record_usage_log_failure(&failure("/a", ErrorCategory::Unknown, "r1", false));

        let snapshot = store.snapshot().usage_logging;
        assert_eq!(snapshot.alert_events, 0);
        assert!(!snapshot.alert_active);
    }
}
