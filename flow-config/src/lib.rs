//! Configuration for flow pipelines and the runner binary.

mod environment;
mod load;
pub mod shared;

pub use environment::{Environment, EnvironmentError};
pub use load::{LoadConfigError, load_config, load_config_from};
