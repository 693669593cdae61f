//! Concurrent generator → workers → aggregator pipeline.
//!
//! A [`pipeline::Pipeline`] runs one generator producing raw [`types::WorkItem`]s, a pool of
//! workers transforming them and one aggregator collecting the results. Stages hand items over
//! through [`concurrency::channel::BoundedChannel`]s whose completion accounting lets the
//! controller know when every in-flight item has been handled, so that shutdown never drops work
//! silently.
//!
//! ```rust,no_run
//! use flow::pipeline::Pipeline;
//! use flow_config::shared::PipelineConfig;
//!
//! # async fn example() -> flow::error::FlowResult<()> {
//! let report = Pipeline::new(PipelineConfig::new(10, 3)).run().await?;
//! report.ensure_complete()?;
//! # Ok(())
//! # }
//! ```

pub mod concurrency;
pub mod delay;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod transform;
pub mod types;
pub mod workers;
