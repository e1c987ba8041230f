use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// Metrics for the batch scheduler.
/// Conventions:
/// - Durations are recorded in seconds (histograms).
/// - Counters are monotonic event counts.
#[derive(Metrics, Clone)]
#[metrics(scope = "opflow_batcher")]
pub struct SchedulerMetrics {
    #[metric(describe = "Duration of a batch submission")]
    pub submit_duration: Histogram,

    #[metric(describe = "Operations per submitted batch")]
    pub batch_size: Histogram,

    #[metric(describe = "Batches submitted")]
    pub batches_submitted: Counter,

    #[metric(describe = "Batch submissions that failed at the transport")]
    pub submit_failures: Counter,

    #[metric(describe = "Flush attempts skipped (policy unmet or flush in flight)")]
    pub flushes_skipped: Counter,
}
