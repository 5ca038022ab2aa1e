//! The river controller. It owns one background task that runs generation cycles until closed:
//!
//! ```text
//!        +--------------------------------------------------------------+
//!        v                                                              |
//! (source.next) --record--> [batcher] --full--> (admission) --> {sink}  |
//!        |                      |                                       |
//!        +--end of cycle--> flush partial --> delay(poll, interruptible)+
//! ```
//!
//! `close()` flips the monotonic `closed` flag and cancels the token. The loop notices at its
//! next check point (before each record, inside an admission wait, during the delay) and stops
//! without submitting anything new. Sink calls already running are left to finish on their own.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::admission::AdmissionController;
use crate::batcher::{Batcher, Flush};
use crate::config::RiverConfig;
use crate::error::{Error, Result};
use crate::observer::{LogObserver, PipelineObserver};
use crate::sink::{Sink, SinkSubmitter, panic_message};
use crate::source::RecordSource;

/// Lifecycle of a [Pipeline].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, not started yet.
    Idle,
    /// The loop task is running.
    Running,
    /// Closed, but the loop task has not finished yet.
    Closing,
    /// The loop task finished.
    Stopped,
}

/// Point in time snapshot of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub in_flight: usize,
    /// Highest in-flight count observed, including the transient overflow increment.
    pub peak_in_flight: usize,
    pub cycles_completed: u64,
    pub batches_submitted: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub records_abandoned: u64,
}

enum LoopTask {
    NotStarted,
    Running(JoinHandle<Result<()>>),
    Finished,
}

/// A river: generates records, batches them, and submits the batches to the sink under admission
/// control, from a background task.
pub struct Pipeline<S, K> {
    config: Arc<RiverConfig>,
    source: Option<S>,
    sink: Arc<K>,
    observer: Arc<dyn PipelineObserver>,
    counters: Arc<Counters>,
    admission: AdmissionController,
    task: LoopTask,
}

impl<S, K> Pipeline<S, K>
where
    S: RecordSource,
    K: Sink + Sync + 'static,
{
    /// Creates a pipeline reporting through the [LogObserver].
    pub fn new(config: RiverConfig, source: S, sink: K) -> Result<Self> {
        let observer = Arc::new(LogObserver::new(
            config.river_name.clone(),
            config.destination.clone(),
        ));
        Self::with_observer(config, source, sink, observer)
    }

    /// Creates a pipeline reporting to the given observer. Fails fast on invalid configuration.
    pub fn with_observer(
        config: RiverConfig,
        source: S,
        sink: K,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            river = %config.river_name,
            records = config.records_per_cycle,
            field = %config.field_name,
            source = source.name(),
            "creating simple stream river"
        );

        let counters = Arc::new(Counters::default());
        let observer: Arc<dyn PipelineObserver> = Arc::new(StatsObserver {
            inner: observer,
            counters: Arc::clone(&counters),
        });
        let admission = AdmissionController::new(
            config.max_in_flight_batches,
            CancellationToken::new(),
            Arc::clone(&observer),
        );

        Ok(Self {
            config: Arc::new(config),
            source: Some(source),
            sink: Arc::new(sink),
            observer,
            counters,
            admission,
            task: LoopTask::NotStarted,
        })
    }

    /// Spawns the loop on the current tokio runtime. Fails if called more than once or outside a
    /// runtime.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.task, LoopTask::NotStarted) {
            return Err(Error::Initialization(format!(
                "river {} is already started",
                self.config.river_name
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Initialization(format!("no tokio runtime to start on: {e}")))?;
        let Some(source) = self.source.take() else {
            return Err(Error::Initialization(format!(
                "river {} has no source",
                self.config.river_name
            )));
        };

        info!(river = %self.config.river_name, "starting simple stream");

        let submitter = SinkSubmitter::new(
            Arc::clone(&self.sink),
            self.admission.clone(),
            Arc::clone(&self.observer),
        );
        let batcher = Batcher::new(
            self.config.batch_size,
            self.config.destination.clone(),
            self.config.id_strategy,
            submitter,
        );
        let river_loop = RiverLoop {
            config: Arc::clone(&self.config),
            source,
            batcher,
            admission: self.admission.clone(),
            observer: Arc::clone(&self.observer),
        };

        self.task = LoopTask::Running(runtime.spawn(river_loop.run()));
        Ok(())
    }

    /// Stops the river cooperatively. Blocked waits are woken up; sink calls in progress are not
    /// aborted. Calling it again has no effect.
    pub fn close(&self) {
        if !self.admission.is_closed() {
            info!(river = %self.config.river_name, "closing simple stream river");
        }
        self.admission.close();
    }

    pub fn state(&self) -> PipelineState {
        match &self.task {
            LoopTask::NotStarted => PipelineState::Idle,
            LoopTask::Finished => PipelineState::Stopped,
            LoopTask::Running(handle) if handle.is_finished() => PipelineState::Stopped,
            LoopTask::Running(_) if self.admission.is_closed() => PipelineState::Closing,
            LoopTask::Running(_) => PipelineState::Running,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            state: self.state(),
            in_flight: self.admission.in_flight(),
            peak_in_flight: self.admission.peak_in_flight(),
            cycles_completed: self.counters.cycles_completed.load(Ordering::Relaxed),
            batches_submitted: self.counters.batches_submitted.load(Ordering::Relaxed),
            batches_succeeded: self.counters.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            records_abandoned: self.counters.records_abandoned.load(Ordering::Relaxed),
        }
    }

    /// Waits for the loop task to finish and returns the error that stopped it, if any. Returns
    /// immediately when the river was never started or was already joined.
    /// Cancelling the returned future leaves the task in place, a later call waits again.
    pub async fn join(&mut self) -> Result<()> {
        let LoopTask::Running(handle) = &mut self.task else {
            return Ok(());
        };
        let result = handle.await;
        self.task = LoopTask::Finished;
        result?
    }

    /// Waits until no batch is in flight.
    pub async fn wait_drained(&self) {
        self.admission.wait_drained().await
    }
}

impl<S, K> Drop for Pipeline<S, K> {
    fn drop(&mut self) {
        // a dropped handle must not leave an orphaned loop running
        self.admission.close();
    }
}

/// State owned by the loop task.
struct RiverLoop<S, K> {
    config: Arc<RiverConfig>,
    source: S,
    batcher: Batcher<K>,
    admission: AdmissionController,
    observer: Arc<dyn PipelineObserver>,
}

enum CycleEnd {
    Completed,
    Closed,
}

impl<S, K> RiverLoop<S, K>
where
    S: RecordSource,
    K: Sink + Sync + 'static,
{
    async fn run(mut self) -> Result<()> {
        // a panicking source must still take the fatal path below
        let result = match AssertUnwindSafe(self.run_cycles()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Error::Generation(format!(
                "record source panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };
        if let Err(e) = &result {
            self.observer.fatal(e);
        }
        // the loop never restarts, whatever ended it
        self.admission.close();
        info!(river = %self.config.river_name, "simple stream river stopped");
        result
    }

    async fn run_cycles(&mut self) -> Result<()> {
        let mut cycle: u64 = 0;

        while !self.admission.is_closed() {
            cycle += 1;
            self.observer
                .cycle_started(cycle, self.config.records_per_cycle);

            if let CycleEnd::Closed = self.run_cycle().await? {
                break;
            }
            self.observer.cycle_completed(cycle);

            if self.config.max_cycles.is_some_and(|max| cycle >= max) {
                info!(river = %self.config.river_name, cycle, "configured number of cycles completed");
                break;
            }

            if !self.delay().await {
                break;
            }
        }
        Ok(())
    }

    /// Generates one cycle worth of records and flushes every batch, the trailing partial one
    /// included.
    async fn run_cycle(&mut self) -> Result<CycleEnd> {
        let records = self.source.next(self.config.records_per_cycle);

        for record in records {
            if self.admission.is_closed() {
                abandon(self.observer.as_ref(), self.batcher.len());
                return Ok(CycleEnd::Closed);
            }

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    abandon(self.observer.as_ref(), self.batcher.len());
                    return Err(e);
                }
            };
            self.batcher.add(record);

            if self.batcher.size_reached() {
                if let Flush::Abandoned { size } = self.batcher.flush().await {
                    abandon(self.observer.as_ref(), size);
                    return Ok(CycleEnd::Closed);
                }
            }
        }

        match self.batcher.flush().await {
            Flush::Abandoned { size } => {
                abandon(self.observer.as_ref(), size);
                Ok(CycleEnd::Closed)
            }
            Flush::Empty | Flush::Submitted { .. } => Ok(CycleEnd::Completed),
        }
    }

    /// Sleeps for the poll interval. Returns `false` when the river was closed meanwhile.
    async fn delay(&mut self) -> bool {
        let poll = self.config.poll_interval;
        if poll.is_zero() {
            // no delay configured, still give other tasks a chance to run
            tokio::task::yield_now().await;
            return !self.admission.is_closed();
        }

        info!(river = %self.config.river_name, ?poll, "next run waiting");
        let cln_token = self.admission.cancellation_token();
        tokio::select! {
            _ = tokio::time::sleep(poll) => !self.admission.is_closed(),
            _ = cln_token.cancelled() => false,
        }
    }
}

fn abandon(observer: &dyn PipelineObserver, records: usize) {
    if records > 0 {
        observer.records_abandoned(records);
    }
}

#[derive(Debug, Default)]
struct Counters {
    cycles_completed: AtomicU64,
    batches_submitted: AtomicU64,
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
    records_abandoned: AtomicU64,
}

/// Keeps the [PipelineStats] counters and forwards every event to the user's observer.
struct StatsObserver {
    inner: Arc<dyn PipelineObserver>,
    counters: Arc<Counters>,
}

impl PipelineObserver for StatsObserver {
    fn cycle_started(&self, cycle: u64, records: usize) {
        self.inner.cycle_started(cycle, records);
    }

    fn cycle_completed(&self, cycle: u64) {
        self.counters
            .cycles_completed
            .fetch_add(1, Ordering::Relaxed);
        self.inner.cycle_completed(cycle);
    }

    fn backpressure(&self, in_flight: usize, threshold: usize) {
        self.inner.backpressure(in_flight, threshold);
    }

    fn batch_submitted(&self, sequence: u64, size: usize, in_flight: usize) {
        self.counters
            .batches_submitted
            .fetch_add(1, Ordering::Relaxed);
        self.inner.batch_submitted(sequence, size, in_flight);
    }

    fn batch_succeeded(&self, sequence: u64, size: usize) {
        self.counters
            .batches_succeeded
            .fetch_add(1, Ordering::Relaxed);
        self.inner.batch_succeeded(sequence, size);
    }

    fn batch_failed(&self, sequence: u64, size: usize, error: &Error) {
        self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.inner.batch_failed(sequence, size, error);
    }

    fn records_abandoned(&self, records: usize) {
        self.counters
            .records_abandoned
            .fetch_add(records as u64, Ordering::Relaxed);
        self.inner.records_abandoned(records);
    }

    fn fatal(&self, error: &Error) {
        self.inner.fatal(error);
    }
}
