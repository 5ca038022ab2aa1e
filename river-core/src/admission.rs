//! Admission control for batches headed to the sink. A submission increments the in-flight
//! counter; when the new count crosses `max_in_flight` the increment is undone, the overflow is
//! reported, and the caller waits until a completion frees a slot (or the river closes), then
//! tries again.
//!
//! The counter and the `closed` flag share one monitor. A waiter registers for the completion
//! signal before it looks at the counter, so a completion landing between the check and the wait
//! is never lost.
//!
//! ```text
//!  admit() --> [in_flight += 1] --(<= max)--> InFlightPermit --drop--> [in_flight -= 1] --> wake one
//!                    |
//!                 (> max)
//!                    v
//!             [in_flight -= 1] --> backpressure --> wait(slot freed | cancelled) --> retry
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::observer::PipelineObserver;

#[derive(Debug, Default)]
struct Monitor {
    in_flight: usize,
    /// Highest value the counter ever reached, including the transient overflow increment.
    peak_in_flight: usize,
    closed: bool,
}

struct Shared {
    monitor: Mutex<Monitor>,
    slot_freed: Notify,
    drained: Notify,
    max_in_flight: usize,
    cln_token: CancellationToken,
}

/// Bounds the number of batches in flight. Cheap to clone, all clones share the same monitor.
#[derive(Clone)]
pub(crate) struct AdmissionController {
    shared: Arc<Shared>,
    observer: Arc<dyn PipelineObserver>,
}

/// Proof of admission. Dropping it marks the batch as completed, exactly once, whatever the
/// outcome of the submission was.
#[must_use]
pub(crate) struct InFlightPermit {
    shared: Arc<Shared>,
    in_flight: usize,
}

impl InFlightPermit {
    /// Value of the in-flight counter right after this permit was granted.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        let drained = {
            let mut monitor = self.shared.monitor.lock();
            debug_assert!(monitor.in_flight > 0, "in-flight counter underflow");
            monitor.in_flight = monitor.in_flight.saturating_sub(1);
            monitor.in_flight == 0
        };
        self.shared.slot_freed.notify_one();
        if drained {
            self.shared.drained.notify_waiters();
        }
    }
}

impl AdmissionController {
    pub(crate) fn new(
        max_in_flight: usize,
        cln_token: CancellationToken,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                monitor: Mutex::new(Monitor::default()),
                slot_freed: Notify::new(),
                drained: Notify::new(),
                max_in_flight,
                cln_token,
            }),
            observer,
        }
    }

    /// Waits for an in-flight slot. Returns `None` once the controller is closed, either before
    /// or while waiting; that is the shutdown signal, not an error.
    pub(crate) async fn admit(&self) -> Option<InFlightPermit> {
        let max_in_flight = self.shared.max_in_flight;

        loop {
            let slot_freed = self.shared.slot_freed.notified();
            tokio::pin!(slot_freed);
            slot_freed.as_mut().enable();

            let attempted = {
                let mut monitor = self.shared.monitor.lock();
                if monitor.closed {
                    return None;
                }

                monitor.in_flight += 1;
                monitor.peak_in_flight = monitor.peak_in_flight.max(monitor.in_flight);
                if monitor.in_flight <= max_in_flight {
                    return Some(InFlightPermit {
                        shared: Arc::clone(&self.shared),
                        in_flight: monitor.in_flight,
                    });
                }

                let attempted = monitor.in_flight;
                monitor.in_flight -= 1;
                attempted
            };

            self.observer.backpressure(attempted, max_in_flight);

            tokio::select! {
                _ = &mut slot_freed => {}
                _ = self.shared.cln_token.cancelled() => return None,
            }
        }
    }

    /// Marks the controller closed and wakes every waiter. Idempotent.
    pub(crate) fn close(&self) {
        self.shared.monitor.lock().closed = true;
        self.shared.cln_token.cancel();
        self.shared.slot_freed.notify_waiters();
    }

    /// Token cancelled by [AdmissionController::close], for other suspension points to select on.
    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.shared.cln_token.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.monitor.lock().closed
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.shared.monitor.lock().in_flight
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.shared.monitor.lock().peak_in_flight
    }

    /// Resolves once no batch is in flight.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            let in_flight = self.shared.monitor.lock().in_flight;
            if in_flight == 0 {
                return;
            }
            drained.await;
        }
    }
}
