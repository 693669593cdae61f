use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Inclusive range, in milliseconds, from which simulated delays are drawn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DelayRangeConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRangeConfig {
    /// A range that always yields a zero delay.
    pub const ZERO: DelayRangeConfig = DelayRangeConfig {
        min_ms: 0,
        max_ms: 0,
    };

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.min_ms > self.max_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("{field}.min_ms"),
                constraint: "must be <= max_ms".to_string(),
            });
        }

        Ok(())
    }
}

/// Delay ranges for the generator and the workers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DelaysConfig {
    /// Delay before each item is generated.
    #[serde(default = "default_generator_delay")]
    pub generator: DelayRangeConfig,
    /// Simulated processing time of each item.
    #[serde(default = "default_worker_delay")]
    pub worker: DelayRangeConfig,
}

impl DelaysConfig {
    /// Default generator delay range: 0 to 500 milliseconds.
    pub const DEFAULT_GENERATOR: DelayRangeConfig = DelayRangeConfig::new(0, 500);

    /// Default worker delay range: 100 to 1000 milliseconds.
    pub const DEFAULT_WORKER: DelayRangeConfig = DelayRangeConfig::new(100, 1000);

    /// Delays that are always zero, useful for deterministic runs.
    pub const fn zero() -> Self {
        Self {
            generator: DelayRangeConfig::ZERO,
            worker: DelayRangeConfig::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.generator.validate("delays.generator")?;
        self.worker.validate("delays.worker")
    }
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            generator: default_generator_delay(),
            worker: default_worker_delay(),
        }
    }
}

fn default_generator_delay() -> DelayRangeConfig {
    DelaysConfig::DEFAULT_GENERATOR
}

fn default_worker_delay() -> DelayRangeConfig {
    DelaysConfig::DEFAULT_WORKER
}
