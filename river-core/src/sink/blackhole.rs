use crate::message::{Batch, DocumentResponse};
use crate::sink::Sink;

/// Blackhole is a sink to emulate /dev/null
pub struct BlackholeSink;

impl Sink for BlackholeSink {
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        let output = batch
            .into_documents()
            .into_iter()
            .map(|document| DocumentResponse::success(document.id))
            .collect();
        Ok(output)
    }
}
