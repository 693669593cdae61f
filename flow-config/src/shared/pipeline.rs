use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::shared::{ChannelConfig, DelaysConfig, ValidationError};

/// Controls when a worker reacts to a shutdown request.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMode {
    /// Shutdown is observed only while a worker waits for its next item, so an item that was
    /// dequeued is always forwarded and acknowledged.
    #[default]
    Deferred,
    /// Shutdown also interrupts the delay and transform of the item in hand. The interrupted
    /// item is reported as abandoned and counted as lost.
    Immediate,
}

impl CancellationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationMode::Deferred => "deferred",
            CancellationMode::Immediate => "immediate",
        }
    }
}

impl fmt::Display for CancellationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of items produced by the generator and expected by the aggregator.
    pub items_count: u64,
    /// Number of concurrent workers.
    pub worker_count: u16,
    /// Channel capacities.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Simulated delays.
    #[serde(default)]
    pub delays: DelaysConfig,
    /// Deadline, in milliseconds, for in-flight work to drain once generation has finished.
    ///
    /// Without a deadline an unacknowledged item makes the pipeline wait forever.
    #[serde(default)]
    pub drain_timeout_ms: Option<u64>,
    /// How workers react to shutdown.
    #[serde(default)]
    pub cancellation: CancellationMode,
}

impl PipelineConfig {
    /// Default number of items.
    pub const DEFAULT_ITEMS_COUNT: u64 = 10;

    /// Default number of workers.
    pub const DEFAULT_WORKER_COUNT: u16 = 3;

    /// Creates a configuration with default channels, delays and cancellation.
    pub fn new(items_count: u64, worker_count: u16) -> Self {
        Self {
            items_count,
            worker_count,
            channel: ChannelConfig::default(),
            delays: DelaysConfig::default(),
            drain_timeout_ms: None,
            cancellation: CancellationMode::default(),
        }
    }

    /// Returns the drain deadline if one is configured.
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }

    /// Validates pipeline configuration settings.
    ///
    /// Ensures there is at least one worker, bounded capacities are non-zero and delay
    /// ranges are well formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.worker_count == 0 {
            return Err(ValidationError::WorkerCountZero);
        }

        self.channel.validate()?;
        self.delays.validate()?;

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ITEMS_COUNT, Self::DEFAULT_WORKER_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::DelayRangeConfig;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.items_count, 10);
        assert_eq!(config.worker_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_items_is_valid() {
        assert!(PipelineConfig::new(0, 3).validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert_eq!(
            PipelineConfig::new(10, 0).validate(),
            Err(ValidationError::WorkerCountZero)
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = PipelineConfig::new(10, 3);
        config.channel.processed_capacity = Some(0);

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidFieldValue { ref field, .. } if field == "channel.processed_capacity"
        ));
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let mut config = PipelineConfig::new(10, 3);
        config.delays.worker = DelayRangeConfig::new(50, 10);

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidFieldValue { ref field, .. } if field == "delays.worker.min_ms"
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"items_count": 5, "worker_count": 1}"#).unwrap();

        assert_eq!(config, PipelineConfig::new(5, 1));
        assert_eq!(config.drain_timeout(), None);
    }

    #[test]
    fn deserializes_cancellation_mode() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"items_count": 5, "worker_count": 1, "cancellation": "immediate", "drain_timeout_ms": 250}"#,
        )
        .unwrap();

        assert_eq!(config.cancellation, CancellationMode::Immediate);
        assert_eq!(config.drain_timeout(), Some(Duration::from_millis(250)));
    }
}
