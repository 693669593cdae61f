//! Logging and metrics initialisation shared by flow binaries and tests.

pub mod metrics;
pub mod tracing;
