//! Prometheus metrics of the river. All metrics live in one global registry and are labeled by
//! the river name so several rivers can share a process.

use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::error::{Error, Result};

const RIVER_REGISTRY_GLOBAL_PREFIX: &str = "river";

const RIVER_NAME_LABEL: &str = "river";
const FAILURE_REASON_LABEL: &str = "reason";

// counters (the _total suffix is added by the prometheus client)
const CYCLES_TOTAL: &str = "cycles";
const RECORDS_TOTAL: &str = "records";
const BATCHES_SUBMITTED_TOTAL: &str = "batches_submitted";
const BATCHES_SUCCEEDED_TOTAL: &str = "batches_succeeded";
const BATCHES_FAILED_TOTAL: &str = "batches_failed";
const BACKPRESSURE_TOTAL: &str = "backpressure";
const ABANDONED_RECORDS_TOTAL: &str = "abandoned_records";

const IN_FLIGHT_BATCHES: &str = "in_flight_batches";

pub(crate) type Labels = Vec<(String, String)>;

/// The global register of all metrics.
struct GlobalRegistry {
    // It is okay to use a sync mutex because each metric is registered only once.
    registry: parking_lot::Mutex<Registry>,
}

impl GlobalRegistry {
    fn new() -> Self {
        GlobalRegistry {
            registry: parking_lot::Mutex::new(Registry::with_prefix(
                RIVER_REGISTRY_GLOBAL_PREFIX,
            )),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::new)
}

/// Metrics of the ingestion pipeline.
pub(crate) struct RiverMetrics {
    pub(crate) cycles_total: Family<Labels, Counter>,
    pub(crate) records_total: Family<Labels, Counter>,
    pub(crate) batches_submitted_total: Family<Labels, Counter>,
    pub(crate) batches_succeeded_total: Family<Labels, Counter>,
    pub(crate) batches_failed_total: Family<Labels, Counter>,
    pub(crate) backpressure_total: Family<Labels, Counter>,
    pub(crate) abandoned_records_total: Family<Labels, Counter>,
    pub(crate) in_flight_batches: Family<Labels, Gauge>,
}

impl RiverMetrics {
    fn new() -> Self {
        let metrics = Self {
            cycles_total: Family::default(),
            records_total: Family::default(),
            batches_submitted_total: Family::default(),
            batches_succeeded_total: Family::default(),
            batches_failed_total: Family::default(),
            backpressure_total: Family::default(),
            abandoned_records_total: Family::default(),
            in_flight_batches: Family::default(),
        };

        let mut registry = global_registry().registry.lock();
        registry.register(
            CYCLES_TOTAL,
            "Total number of generation cycles started",
            metrics.cycles_total.clone(),
        );
        registry.register(
            RECORDS_TOTAL,
            "Total number of records submitted to the sink",
            metrics.records_total.clone(),
        );
        registry.register(
            BATCHES_SUBMITTED_TOTAL,
            "Total number of batches handed to the sink",
            metrics.batches_submitted_total.clone(),
        );
        registry.register(
            BATCHES_SUCCEEDED_TOTAL,
            "Total number of batches the sink accepted",
            metrics.batches_succeeded_total.clone(),
        );
        registry.register(
            BATCHES_FAILED_TOTAL,
            "Total number of batches that failed and were dropped",
            metrics.batches_failed_total.clone(),
        );
        registry.register(
            BACKPRESSURE_TOTAL,
            "Number of times a submission had to wait for an in-flight slot",
            metrics.backpressure_total.clone(),
        );
        registry.register(
            ABANDONED_RECORDS_TOTAL,
            "Records that were never submitted because the river shut down",
            metrics.abandoned_records_total.clone(),
        );
        registry.register(
            IN_FLIGHT_BATCHES,
            "Batches submitted to the sink whose outcome has not been observed yet",
            metrics.in_flight_batches.clone(),
        );
        metrics
    }
}

static RIVER_METRICS: OnceLock<RiverMetrics> = OnceLock::new();

pub(crate) fn river_metrics() -> &'static RiverMetrics {
    RIVER_METRICS.get_or_init(RiverMetrics::new)
}

pub(crate) fn river_metric_labels(river_name: &str) -> Labels {
    vec![(RIVER_NAME_LABEL.to_string(), river_name.to_string())]
}

pub(crate) fn river_failure_labels(river_name: &str, reason: &str) -> Labels {
    vec![
        (RIVER_NAME_LABEL.to_string(), river_name.to_string()),
        (FAILURE_REASON_LABEL.to_string(), reason.to_string()),
    ]
}

/// Renders every registered metric in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String> {
    // make sure the river metrics are registered even if nothing was recorded yet
    river_metrics();

    let mut buffer = String::new();
    let registry = global_registry().registry.lock();
    encode(&mut buffer, &registry).map_err(|e| Error::Metrics(e.to_string()))?;
    Ok(buffer)
}
