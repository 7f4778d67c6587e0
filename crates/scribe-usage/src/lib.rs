//! Usage accounting for Scribe
//!
//! Persists one audit row per completed AI request and keeps in-memory
//! request metrics. The audit write is deliberately non-fatal: when it
//! fails, the failure is classified and tracked by the metrics store,
//! including the "degraded success" case where the business request
//! itself succeeded, and escalated to an alert signal at configured
//! thresholds.

#![allow(clippy::must_use_candidate)]

pub mod classify;
pub mod logger;
pub mod metrics;
pub mod tokens;

pub use classify::{ErrorCategory, classify_error};
pub use logger::{UsageLogger, UsageRecord, estimate_cost, infer_task_type, split_model};
pub use metrics::{MetricsSnapshot, MetricsStore, RequestMetric, UsageLogFailure};
pub use tokens::estimate_tokens;
