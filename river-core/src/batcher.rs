use std::mem;

use chrono::Utc;

use crate::message::{Batch, Destination, Document, DocumentIdStrategy, Record};
use crate::sink::{Sink, SinkSubmitter, Submission};

/// Outcome of [Batcher::flush].
#[derive(Debug)]
pub(crate) enum Flush {
    /// Nothing was accumulated, nothing was submitted.
    Empty,
    /// The batch was handed to the sink.
    Submitted { sequence: u64, size: usize },
    /// The river closed while the batch waited for admission; its documents are dropped.
    Abandoned { size: usize },
}

/// Accumulates documents into the current batch and hands full (or, on demand, partial) batches
/// to the [SinkSubmitter]. Owned by the loop task alone.
pub(crate) struct Batcher<K> {
    batch_size: usize,
    destination: Destination,
    id_strategy: DocumentIdStrategy,
    next_sequence: u64,
    current: Batch,
    submitter: SinkSubmitter<K>,
}

impl<K> Batcher<K>
where
    K: Sink + Sync + 'static,
{
    pub(crate) fn new(
        batch_size: usize,
        destination: Destination,
        id_strategy: DocumentIdStrategy,
        submitter: SinkSubmitter<K>,
    ) -> Self {
        let current = Batch::new(1, destination.clone(), batch_size);
        Self {
            batch_size,
            destination,
            id_strategy,
            next_sequence: 2,
            current,
            submitter,
        }
    }

    /// Appends the record to the current batch under a freshly generated document id.
    pub(crate) fn add(&mut self, record: Record) {
        self.current.push(Document {
            id: self.id_strategy.generate(),
            event_time: Utc::now(),
            record,
        });
    }

    pub(crate) fn size_reached(&self) -> bool {
        self.current.len() >= self.batch_size
    }

    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    /// Swaps in a new empty batch and submits the old one, full or partial.
    pub(crate) async fn flush(&mut self) -> Flush {
        if self.current.is_empty() {
            return Flush::Empty;
        }

        let next = Batch::new(self.next_sequence, self.destination.clone(), self.batch_size);
        self.next_sequence += 1;
        let batch = mem::replace(&mut self.current, next);

        let sequence = batch.sequence;
        let size = batch.len();
        match self.submitter.submit(batch).await {
            Submission::Submitted => Flush::Submitted { sequence, size },
            Submission::Abandoned(batch) => Flush::Abandoned { size: batch.len() },
        }
    }
}
