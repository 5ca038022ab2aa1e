use crate::Result;
use crate::message::Record;

/// Produces the records ingested during one cycle.
pub trait RecordSource: Send + 'static {
    /// Name of the source.
    fn name(&self) -> &'static str;

    /// Yields the records of one cycle, one at a time. An `Err` item is a generation failure and
    /// stops the pipeline.
    fn next(&mut self, count: usize) -> impl Iterator<Item = Result<Record>> + Send + '_;
}

/// Generates `{field: i}` for `i` in `0..count`. Every cycle starts again from 0.
#[derive(Debug, Clone)]
pub struct SequenceSource {
    field_name: String,
}

impl SequenceSource {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
        }
    }
}

impl RecordSource for SequenceSource {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn next(&mut self, count: usize) -> impl Iterator<Item = Result<Record>> + Send + '_ {
        (0..count).map(|i| Ok(Record::new(self.field_name.as_str(), i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_sequence_source() {
        let mut source = SequenceSource::new("test");
        let records: Vec<Record> = source.next(5).collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.get("test"), Some(&Value::from(i)));
        }
    }

    #[test]
    fn test_sequence_restarts_every_cycle() {
        let mut source = SequenceSource::new("n");
        let first: Vec<Record> = source.next(3).collect::<Result<_>>().unwrap();
        let second: Vec<Record> = source.next(3).collect::<Result<_>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(second[0].get("n"), Some(&Value::from(0)));
    }

    #[test]
    fn test_empty_cycle() {
        let mut source = SequenceSource::new("n");
        assert_eq!(source.next(0).count(), 0);
    }
}
