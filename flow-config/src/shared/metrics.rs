use serde::{Deserialize, Serialize};

/// Prometheus exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Port on which the `/metrics` endpoint listens.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl MetricsConfig {
    /// Default metrics port.
    pub const DEFAULT_PORT: u16 = 9000;
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    MetricsConfig::DEFAULT_PORT
}
