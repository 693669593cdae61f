use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Capacity settings for the two channels of a pipeline.
///
/// `None` means the channel is unbounded. A bounded channel makes producers wait while it is
/// full, which is how backpressure propagates from the aggregator back to the generator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// Capacity of the channel between the generator and the workers.
    #[serde(default)]
    pub raw_capacity: Option<usize>,
    /// Capacity of the channel between the workers and the aggregator.
    #[serde(default)]
    pub processed_capacity: Option<usize>,
}

impl ChannelConfig {
    /// Validates that bounded capacities are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, capacity) in [
            ("channel.raw_capacity", self.raw_capacity),
            ("channel.processed_capacity", self.processed_capacity),
        ] {
            if capacity == Some(0) {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0 when set".to_string(),
                });
            }
        }

        Ok(())
    }
}
