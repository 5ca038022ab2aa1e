//! Sink doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::Error;
use crate::message::{Batch, DocumentResponse};
use crate::sink::Sink;

fn accept_all(batch: &Batch) -> Vec<DocumentResponse> {
    batch
        .documents()
        .iter()
        .map(|d| DocumentResponse::success(d.id.clone()))
        .collect()
}

/// Accepts every batch and remembers it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    batches: Mutex<Vec<Batch>>,
}

impl RecordingSink {
    pub(crate) fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Batch::len).collect()
    }
}

impl Sink for RecordingSink {
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        let responses = accept_all(&batch);
        self.batches.lock().push(batch);
        Ok(responses)
    }
}

/// Fails every batch with a transport error.
pub(crate) struct FailingSink;

impl Sink for FailingSink {
    async fn write(&self, _batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        Err(Error::Sink("connection refused".to_string()))
    }
}

/// Answers, but rejects every document.
pub(crate) struct RejectingSink;

impl Sink for RejectingSink {
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        Ok(batch
            .documents()
            .iter()
            .map(|d| DocumentResponse::failed(d.id.clone(), "document already exists"))
            .collect())
    }
}

/// Never completes a write.
#[derive(Default)]
pub(crate) struct PendingSink {
    calls: AtomicUsize,
}

impl PendingSink {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sink for PendingSink {
    async fn write(&self, _batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Panics inside the write call.
pub(crate) struct PanickingSink;

impl Sink for PanickingSink {
    async fn write(&self, _batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        panic!("transport blew up")
    }
}

/// Holds every write until the test releases it.
pub(crate) struct GatedSink {
    gate: Semaphore,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl GatedSink {
    pub(crate) fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Lets `n` writes finish.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Sink for GatedSink {
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|e| Error::Sink(e.to_string()))?
            .forget();
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(accept_all(&batch))
    }
}
