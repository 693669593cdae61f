//! Shared configuration types for flow pipelines.

mod base;
mod channel;
mod delay;
mod metrics;
mod pipeline;
mod runner;

pub use base::ValidationError;
pub use channel::ChannelConfig;
pub use delay::{DelayRangeConfig, DelaysConfig};
pub use metrics::MetricsConfig;
pub use pipeline::{CancellationMode, PipelineConfig};
pub use runner::RunnerConfig;
