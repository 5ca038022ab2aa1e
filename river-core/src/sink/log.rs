use tracing::info;

use crate::message::{Batch, DocumentResponse};
use crate::sink::Sink;

pub struct LogSink {
    river_name: String,
}

impl LogSink {
    pub fn new(river_name: impl Into<String>) -> Self {
        Self {
            river_name: river_name.into(),
        }
    }
}

impl Sink for LogSink {
    async fn write(&self, batch: Batch) -> crate::Result<Vec<DocumentResponse>> {
        let destination = batch.destination.to_string();
        let mut result = Vec::with_capacity(batch.len());
        for document in batch.into_documents() {
            let log_line = format!(
                "({}) Destination - {} ID - {} EventTime - {} Source - {}",
                self.river_name,
                destination,
                document.id,
                document.event_time.timestamp_millis(),
                document.record,
            );
            info!("{}", log_line);
            result.push(DocumentResponse::success(document.id));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::LogSink;
    use crate::message::{Batch, Destination, Document, DocumentResponse, Record};
    use crate::sink::Sink;

    #[tokio::test]
    async fn test_log_sink() {
        let sink = LogSink::new("log-river");
        let mut batch = Batch::new(
            1,
            Destination {
                index: "idx".to_string(),
                type_name: "simple_type".to_string(),
            },
            2,
        );
        for (i, id) in ["first", "second"].into_iter().enumerate() {
            batch.push(Document {
                id: id.to_string(),
                event_time: Utc::now(),
                record: Record::new("test", i),
            });
        }

        let responses = sink.write(batch).await.unwrap();
        assert_eq!(
            responses,
            vec![
                DocumentResponse::success("first"),
                DocumentResponse::success("second")
            ]
        );
    }
}
