//! A streaming ingestion river. Each cycle a [RecordSource] produces a fixed number of records,
//! they are grouped into batches of a configured size, and every batch is handed to a [Sink]
//! without waiting for the outcome. Admission control caps the batches in flight: a submission
//! past the threshold waits until an earlier one completes.
//!
//! ```text
//! RecordSource --> Batcher --> AdmissionController --> SinkSubmitter --> Sink
//!                                     ^                                   |
//!                                     +----------- completion ------------+
//! ```
//!
//! The [Pipeline] runs the cycles from a background task and stops cooperatively on
//! [Pipeline::close].

pub use self::error::{Error, Result};

mod error;

/// Admission control bounding the number of in-flight batches.
mod admission;

mod batcher;

/// Configuration of a river, loaded from the environment.
pub mod config;
pub use crate::config::{ENV_RIVER_SETTINGS_OBJECT, RiverConfig, RiverSettings, parse_time_value};

mod message;
pub use crate::message::{
    Batch, Destination, Document, DocumentIdStrategy, DocumentResponse, DocumentStatus, Record,
};

mod metrics;
pub use crate::metrics::encode_metrics;

mod observer;
pub use crate::observer::{LogObserver, PipelineObserver};

mod pipeline;
pub use crate::pipeline::{Pipeline, PipelineState, PipelineStats};

/// Sinks and the submission of batches to them.
pub mod sink;
pub use crate::sink::blackhole::BlackholeSink;
pub use crate::sink::log::LogSink;
pub use crate::sink::{LocalSink, Sink};

mod source;
pub use crate::source::{RecordSource, SequenceSource};
