use serde::{Deserialize, Serialize};

use crate::shared::{MetricsConfig, PipelineConfig, ValidationError};

/// Top-level configuration of the `flow-runner` binary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Pipeline run by the binary.
    pub pipeline: PipelineConfig,
    /// Prometheus exporter; metrics are not exported when absent.
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()
    }
}
