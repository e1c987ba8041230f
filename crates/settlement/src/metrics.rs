use metrics::Counter;
use metrics_derive::Metrics;

/// Metrics for the settlement correlator.
/// Conventions:
/// - Counters are monotonic event counts.
#[derive(Metrics, Clone)]
#[metrics(scope = "opflow_settlement")]
pub struct CorrelatorMetrics {
    #[metric(describe = "Operations resolved with a successful settlement")]
    pub settled: Counter,

    #[metric(describe = "Operations rejected with a decoded revert reason")]
    pub reverted: Counter,

    #[metric(describe = "Pending settlements cancelled by their caller")]
    pub cancelled: Counter,

    #[metric(describe = "Observed events discarded as stale")]
    pub stale_events: Counter,
}
