//! Metric names emitted by the pipeline.

/// Label for the worker id in metrics.
pub const WORKER_ID_LABEL: &str = "worker_id";

/// Label for the channel name in metrics.
pub const CHANNEL_LABEL: &str = "channel";

/// Counter of items produced by the generator.
pub const FLOW_ITEMS_GENERATED_TOTAL: &str = "flow_items_generated_total";

/// Counter of items transformed successfully, labeled by worker.
pub const FLOW_ITEMS_PROCESSED_TOTAL: &str = "flow_items_processed_total";

/// Counter of items whose transform failed, labeled by worker.
pub const FLOW_ITEMS_FAILED_TOTAL: &str = "flow_items_failed_total";

/// Counter of dequeued items interrupted by shutdown, labeled by worker.
pub const FLOW_ITEMS_LOST_TOTAL: &str = "flow_items_lost_total";

/// Counter of queued items abandoned at shutdown, labeled by channel.
pub const FLOW_ITEMS_ABANDONED_TOTAL: &str = "flow_items_abandoned_total";

/// Counter of items received by the aggregator.
pub const FLOW_ITEMS_AGGREGATED_TOTAL: &str = "flow_items_aggregated_total";

/// Histogram of full pipeline run durations in seconds.
pub const FLOW_PIPELINE_DURATION_SECONDS: &str = "flow_pipeline_duration_seconds";
