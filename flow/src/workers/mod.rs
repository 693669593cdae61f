//! Pipeline stages: the generator, the processor workers and their pool, and the aggregator.

pub mod aggregator;
pub mod base;
pub mod generator;
pub mod pool;
pub mod processor;
