//! Events emitted by the pipeline. Everything that happens to cycles and batches is reported to
//! the [PipelineObserver] the pipeline was constructed with. Lifecycle messages (creation, start,
//! close, stop, the idle delay) are still logged straight to `tracing` by the pipeline itself.

use tracing::{debug, error, info, warn};

use crate::Error;
use crate::message::Destination;
use crate::metrics::{river_failure_labels, river_metric_labels, river_metrics};

/// Receiver of pipeline events. Every method has an empty default so observers only implement
/// what they care about.
#[allow(unused_variables)]
pub trait PipelineObserver: Send + Sync + 'static {
    /// A new cycle is about to generate `records` records.
    fn cycle_started(&self, cycle: u64, records: usize) {}

    /// Every batch of the cycle was flushed.
    fn cycle_completed(&self, cycle: u64) {}

    /// A submission crossed the in-flight threshold and the loop is going to wait.
    fn backpressure(&self, in_flight: usize, threshold: usize) {}

    /// A batch was admitted and handed to the sink.
    fn batch_submitted(&self, sequence: u64, size: usize, in_flight: usize) {}

    /// The sink accepted every document of the batch.
    fn batch_succeeded(&self, sequence: u64, size: usize) {}

    /// The batch failed and was dropped.
    fn batch_failed(&self, sequence: u64, size: usize, error: &Error) {}

    /// Records that were accumulated but never submitted because the pipeline closed.
    fn records_abandoned(&self, records: usize) {}

    /// The loop hit an unrecoverable error and stopped.
    fn fatal(&self, error: &Error) {}
}

/// Default observer: structured `tracing` events plus Prometheus metrics.
#[derive(Debug, Clone)]
pub struct LogObserver {
    river_name: String,
    destination: Destination,
}

impl LogObserver {
    pub fn new(river_name: impl Into<String>, destination: Destination) -> Self {
        Self {
            river_name: river_name.into(),
            destination,
        }
    }
}

impl PipelineObserver for LogObserver {
    fn cycle_started(&self, cycle: u64, records: usize) {
        info!(river = %self.river_name, cycle, records, "starting generation cycle");
        river_metrics()
            .cycles_total
            .get_or_create(&river_metric_labels(&self.river_name))
            .inc();
    }

    fn cycle_completed(&self, cycle: u64) {
        debug!(river = %self.river_name, cycle, "generation cycle completed");
    }

    fn backpressure(&self, in_flight: usize, threshold: usize) {
        warn!(
            river = %self.river_name,
            in_flight,
            threshold,
            "ongoing bulk crossed threshold, waiting"
        );
        river_metrics()
            .backpressure_total
            .get_or_create(&river_metric_labels(&self.river_name))
            .inc();
    }

    fn batch_submitted(&self, sequence: u64, size: usize, in_flight: usize) {
        debug!(
            river = %self.river_name,
            destination = %self.destination,
            sequence,
            size,
            in_flight,
            "batch submitted"
        );
        let labels = river_metric_labels(&self.river_name);
        river_metrics()
            .batches_submitted_total
            .get_or_create(&labels)
            .inc();
        river_metrics()
            .records_total
            .get_or_create(&labels)
            .inc_by(size as u64);
        river_metrics().in_flight_batches.get_or_create(&labels).inc();
    }

    fn batch_succeeded(&self, sequence: u64, size: usize) {
        debug!(river = %self.river_name, sequence, size, "batch completed");
        let labels = river_metric_labels(&self.river_name);
        river_metrics()
            .batches_succeeded_total
            .get_or_create(&labels)
            .inc();
        river_metrics().in_flight_batches.get_or_create(&labels).dec();
    }

    fn batch_failed(&self, sequence: u64, size: usize, error: &Error) {
        warn!(
            river = %self.river_name,
            destination = %self.destination,
            sequence,
            size,
            ?error,
            "failed to execute bulk, dropping batch"
        );
        let reason = match error {
            Error::Sink(_) => "sink",
            _ => "other",
        };
        river_metrics()
            .batches_failed_total
            .get_or_create(&river_failure_labels(&self.river_name, reason))
            .inc();
        river_metrics()
            .in_flight_batches
            .get_or_create(&river_metric_labels(&self.river_name))
            .dec();
    }

    fn records_abandoned(&self, records: usize) {
        info!(
            river = %self.river_name,
            records,
            "river is closing, abandoning records that were not submitted"
        );
        river_metrics()
            .abandoned_records_total
            .get_or_create(&river_metric_labels(&self.river_name))
            .inc_by(records as u64);
    }

    fn fatal(&self, error: &Error) {
        error!(river = %self.river_name, ?error, "river stopped on unrecoverable error");
    }
}
