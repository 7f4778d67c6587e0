use serde::Deserialize;

/// Usage logging and degraded-mode alerting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageConfig {
    /// Alert every time the usage-log failure counter reaches a
    /// multiple of this value
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u64,
    /// How many recent usage-log failure samples to retain
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            sample_limit: default_sample_limit(),
        }
    }
}

const fn default_alert_threshold() -> u64 {
    10
}

const fn default_sample_limit() -> usize {
    50
}
