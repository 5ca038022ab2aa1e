use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A generated key-value record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates a record holding a single field.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(field.into(), value.into());
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// Where the documents of a batch are written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub index: String,
    pub type_name: String,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.type_name)
    }
}

/// How document identifiers are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentIdStrategy {
    /// Random (v4) UUID per document.
    #[default]
    Uuid,
    /// Time-ordered (v7) UUID per document.
    UuidV7,
}

impl DocumentIdStrategy {
    pub fn generate(&self) -> String {
        match self {
            DocumentIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            DocumentIdStrategy::UuidV7 => uuid::Uuid::now_v7().to_string(),
        }
    }
}

/// A record addressed for the sink. Documents are always written with `create` semantics, the
/// sink must reject an id that already exists instead of overwriting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub event_time: DateTime<Utc>,
    pub record: Record,
}

/// Ordered group of documents submitted to the sink together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Monotonically increasing per pipeline, starting at 1.
    pub sequence: u64,
    pub destination: Destination,
    documents: Vec<Document>,
}

/// Upper bound on the documents reserved up front; larger batches grow as they fill.
const MAX_PREALLOCATED_DOCUMENTS: usize = 1024;

impl Batch {
    pub(crate) fn new(sequence: u64, destination: Destination, capacity: usize) -> Self {
        Self {
            sequence,
            destination,
            documents: Vec::with_capacity(capacity.min(MAX_PREALLOCATED_DOCUMENTS)),
        }
    }

    pub(crate) fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

/// Per document outcome reported by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResponse {
    pub id: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentStatus {
    Success,
    Failed(String),
}

impl DocumentResponse {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DocumentStatus::Success,
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DocumentStatus::Failed(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, DocumentStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_fields() {
        let record = Record::new("test", 7);
        assert_eq!(record.get("test"), Some(&Value::from(7)));
        assert_eq!(record.get("other"), None);
        assert_eq!(record.to_string(), r#"{"test":7}"#);
    }

    #[test]
    fn test_batch_preallocation_is_bounded() {
        let destination = Destination {
            index: "idx".to_string(),
            type_name: "simple_type".to_string(),
        };
        let mut batch = Batch::new(1, destination, usize::MAX / 2);
        assert!(batch.documents.capacity() <= MAX_PREALLOCATED_DOCUMENTS);

        batch.push(Document {
            id: "a".to_string(),
            event_time: chrono::Utc::now(),
            record: Record::new("test", 0),
        });
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_id_strategies_are_unique() {
        for strategy in [DocumentIdStrategy::Uuid, DocumentIdStrategy::UuidV7] {
            let ids: HashSet<String> = (0..1000).map(|_| strategy.generate()).collect();
            assert_eq!(ids.len(), 1000);
        }
    }

    #[test]
    fn test_uuid_v7_ids_are_time_ordered() {
        let first = uuid::Uuid::parse_str(&DocumentIdStrategy::UuidV7.generate()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = uuid::Uuid::parse_str(&DocumentIdStrategy::UuidV7.generate()).unwrap();
        assert_eq!(first.get_version_num(), 7);
        assert!(first < second);
    }
}
