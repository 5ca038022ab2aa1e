use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::Error;
use crate::admission::{AdmissionController, InFlightPermit};
use crate::message::{Batch, DocumentResponse, DocumentStatus};
use crate::observer::PipelineObserver;

/// Logs every document and accepts it.
pub mod log;

/// Accepts and discards everything, the sink equivalent of /dev/null.
pub mod blackhole;

#[cfg(test)]
pub(crate) mod test_utils;

/// Downstream system that stores batches. Calls for different batches run concurrently, so the
/// sink is shared behind an [Arc] and only borrowed immutably.
#[trait_variant::make(Sink: Send)]
pub trait LocalSink {
    /// Writes the batch and reports the outcome per document. An `Err` fails the whole batch.
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>>;
}

impl<T> Sink for Arc<T>
where
    T: Sink + Sync,
{
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        Sink::write(&**self, batch).await
    }
}

/// Result of handing a batch to the [SinkSubmitter].
#[derive(Debug)]
pub(crate) enum Submission {
    /// The batch was admitted and its sink call is running in the background.
    Submitted,
    /// The river closed before the batch could be admitted.
    Abandoned(Batch),
}

/// Submits batches to the sink without waiting for the outcome. Admission is obtained first; the
/// permit travels with the sink call and is released once the outcome is known.
pub(crate) struct SinkSubmitter<K> {
    sink: Arc<K>,
    admission: AdmissionController,
    observer: Arc<dyn PipelineObserver>,
}

impl<K> SinkSubmitter<K>
where
    K: Sink + Sync + 'static,
{
    pub(crate) fn new(
        sink: Arc<K>,
        admission: AdmissionController,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            sink,
            admission,
            observer,
        }
    }

    /// Blocks only while waiting for admission, never on the sink itself.
    pub(crate) async fn submit(&self, batch: Batch) -> Submission {
        let Some(permit) = self.admission.admit().await else {
            return Submission::Abandoned(batch);
        };

        self.observer
            .batch_submitted(batch.sequence, batch.len(), permit.in_flight());

        tokio::spawn(write_batch(
            Arc::clone(&self.sink),
            batch,
            permit,
            Arc::clone(&self.observer),
        ));

        Submission::Submitted
    }
}

/// Runs one best-effort sink call. Whatever happens, including a panic inside the sink, the
/// outcome is reported and the permit is released exactly once.
async fn write_batch<K>(
    sink: Arc<K>,
    batch: Batch,
    permit: InFlightPermit,
    observer: Arc<dyn PipelineObserver>,
) where
    K: Sink + Sync + 'static,
{
    let sequence = batch.sequence;
    let size = batch.len();

    let write = Sink::write(&*sink, batch);
    let outcome = match AssertUnwindSafe(write).catch_unwind().await {
        Ok(result) => result.and_then(|responses| check_responses(&responses, size)),
        Err(payload) => Err(Error::Sink(format!(
            "sink panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    match outcome {
        Ok(()) => observer.batch_succeeded(sequence, size),
        Err(e) => observer.batch_failed(sequence, size, &e),
    }

    drop(permit);
}

/// A batch fails as a whole when the sink rejected any of its documents.
fn check_responses(responses: &[DocumentResponse], size: usize) -> crate::Result<()> {
    let mut rejected = responses.iter().filter_map(|r| match &r.status {
        DocumentStatus::Success => None,
        DocumentStatus::Failed(reason) => Some((r.id.as_str(), reason.as_str())),
    });

    match rejected.next() {
        None => Ok(()),
        Some((id, reason)) => Err(Error::Sink(format!(
            "{} of {size} documents rejected, first failure on {id}: {reason}",
            1 + rejected.count()
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
