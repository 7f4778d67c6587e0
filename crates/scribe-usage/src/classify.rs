//! Usage-log failure classification
//!
//! Failures writing the audit row are bucketed by matching the error's
//! class name and message against keyword lists, checked in priority
//! order. Pattern-matching on error text is crude but deliberate: the
//! write path sees errors from several layers and only needs a coarse
//! bucket for telemetry.

use serde::Serialize;

/// Coarse failure category for usage-log write errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Network,
    DbWrite,
    Unknown,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::DbWrite => "db_write",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "timedout"];

const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "refused",
    "reset",
    "unreachable",
    "broken pipe",
    "dns",
];

const DB_WRITE_KEYWORDS: &[&str] = &[
    "constraint",
    "duplicate",
    "unique",
    "foreign key",
    "not null",
    "syntax",
    "column",
    "relation",
    "database",
];

/// Classify a usage-log write failure from its class name and message
///
/// Both inputs are searched; timeout wins over network wins over
/// db_write, with everything else landing in unknown.
pub fn classify_error(class_name: &str, message: &str) -> ErrorCategory {
    let haystack = format!("{class_name} {message}").to_lowercase();

    if contains_any(&haystack, TIMEOUT_KEYWORDS) {
        ErrorCategory::Timeout
    } else if contains_any(&haystack, NETWORK_KEYWORDS) {
        ErrorCategory::Network
    } else if contains_any(&haystack, DB_WRITE_KEYWORDS) {
        ErrorCategory::DbWrite
    } else {
        ErrorCategory::Unknown
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
