use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info_span, Instrument};

use super::errors::{QueueError, QueueResult};
use super::metrics::{QueueMetrics, QueueMetricsSnapshot};
use super::pending::Pending;
use super::types::QueueConfig;
use crate::error::{panic_message, CommonError};
use crate::observability::{self, UnobservedFailure, UnobservedFailureHook};

type Unit = BoxFuture<'static, ()>;

/// State shared between the queue handle, its worker and every `Pending`
pub(crate) struct QueueShared {
    label: String,
    reporter: Option<UnobservedFailureHook>,
    metrics: QueueMetrics,
}

impl QueueShared {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn report_unobserved(
        &self,
        operation: &'static str,
        error: &(dyn Error + Send + Sync + 'static),
    ) {
        self.metrics.record_unobserved();
        observability::report_unobserved(
            self.reporter.as_ref(),
            &UnobservedFailure { queue: &self.label, operation, error },
        );
    }
}

/// Single-worker FIFO task queue
///
/// Units run one at a time, strictly in the order `enqueue` was called. A
/// unit that fails or panics resolves only its own [`Pending`]; the worker
/// moves on to the next unit.
///
/// The worker is a tokio task spawned on the runtime that was current when
/// the queue was created. It stops once every handle is dropped and the
/// remaining units have drained.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Unit>,
    shared: Arc<QueueShared>,
}

impl SerialQueue {
    /// Create a queue and spawn its worker on the current runtime
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        config.validate().map_err(|msg| CommonError::config_field("label", msg))?;
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let QueueConfig { label, reporter } = config;
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_worker(rx, label.clone()));

        Ok(Self { tx, shared: Arc::new(QueueShared { label, reporter, metrics: QueueMetrics::new() }) })
    }

    /// Schedule a unit of work
    ///
    /// The unit is placed on the queue before this call returns; `task` is
    /// invoked only when the worker reaches it.
    pub fn enqueue<F, Fut, T, E>(&self, operation: &'static str, task: F) -> Pending<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + From<QueueError> + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let span = info_span!("lifecycle_unit", queue = %shared.label, operation);

        let unit = async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { task().await }).catch_unwind().await;
            let elapsed = started.elapsed();
            let duration_ms = elapsed.as_millis() as u64;

            let result = match outcome {
                Ok(Ok(value)) => {
                    shared.metrics.record_completion(duration_ms);
                    observability::log_unit_outcome(&shared.label, operation, elapsed, true);
                    Ok(value)
                }
                Ok(Err(err)) => {
                    shared.metrics.record_failure(duration_ms);
                    observability::log_unit_outcome(&shared.label, operation, elapsed, false);
                    Err(err)
                }
                Err(payload) => {
                    shared.metrics.record_panic(duration_ms);
                    let message = panic_message(&*payload);
                    error!(queue = %shared.label, operation, panic = %message, "lifecycle_unit_panicked");
                    Err(E::from(QueueError::Panicked { operation, message }))
                }
            };

            if let Err(Err(err)) = result_tx.send(result) {
                shared.report_unobserved(operation, &err);
            }
        }
        .instrument(span)
        .boxed();

        self.shared.metrics.record_enqueue();
        if self.tx.send(unit).is_err() {
            // The dropped unit drops `result_tx`, so the Pending resolves to Closed.
            debug!(queue = %self.shared.label, operation, "serial_queue_rejected_unit");
        }

        Pending::new(result_rx, Arc::clone(&self.shared), operation)
    }

    /// Resolve once every unit enqueued before this call has finished
    ///
    /// Units enqueued after the call do not delay it. A queue whose worker
    /// has stopped is trivially idle.
    pub fn idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let (marker_tx, marker_rx) = oneshot::channel::<()>();
        let marker: Unit = async move {
            let _ = marker_tx.send(());
        }
        .boxed();
        let _ = self.tx.send(marker);

        async move {
            let _ = marker_rx.await;
        }
    }

    /// Label this queue reports under
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Whether the worker has stopped accepting units
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Snapshot of the queue counters
    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .field("metrics", &self.metrics())
            .finish()
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Unit>, label: String) {
    debug!(queue = %label, "serial_queue_worker_started");
    while let Some(unit) = rx.recv().await {
        unit.await;
    }
    debug!(queue = %label, "serial_queue_worker_stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum UnitError {
        #[error("unit failed: {0}")]
        Failed(&'static str),
        #[error(transparent)]
        Queue(#[from] QueueError),
    }

    fn queue() -> SerialQueue {
        SerialQueue::new(QueueConfig::new("queue-test")).unwrap()
    }

    /// Validates FIFO order when earlier units take longer than later ones.
    ///
    /// Assertions:
    /// - Confirms the slow first unit finishes before the fast second starts.
    #[tokio::test]
    async fn test_units_run_in_submission_order() {
        let queue = queue();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            queue.enqueue("slow", move || async move {
                log.lock().push("slow:start");
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.lock().push("slow:end");
                Ok::<_, UnitError>(1)
            })
        };
        let fast = {
            let log = Arc::clone(&log);
            queue.enqueue("fast", move || async move {
                log.lock().push("fast:start");
                log.lock().push("fast:end");
                Ok::<_, UnitError>(2)
            })
        };

        assert_eq!(fast.await.unwrap(), 2);
        assert_eq!(slow.await.unwrap(), 1);
        assert_eq!(*log.lock(), vec!["slow:start", "slow:end", "fast:start", "fast:end"]);
    }

    /// Validates that a failing unit does not stop later units.
    #[tokio::test]
    async fn test_failure_is_isolated_to_its_unit() {
        let queue = queue();

        let failing = queue.enqueue("failing", || async { Err::<(), _>(UnitError::Failed("bad")) });
        let next = queue.enqueue("next", || async { Ok::<_, UnitError>("ran") });

        assert!(matches!(failing.await, Err(UnitError::Failed("bad"))));
        assert_eq!(next.await.unwrap(), "ran");
        assert_eq!(queue.metrics().total_failed, 1);
        assert_eq!(queue.metrics().total_completed, 1);
    }

    /// Validates that a panicking unit resolves to `QueueError::Panicked` and
    /// the worker survives.
    #[tokio::test]
    async fn test_panic_is_isolated_to_its_unit() {
        let queue = queue();

        let panicking = queue.enqueue("panicking", || async {
            if true {
                panic!("unit exploded");
            }
            Ok::<(), UnitError>(())
        });
        let next = queue.enqueue("next", || async { Ok::<_, UnitError>(7) });

        match panicking.await {
            Err(UnitError::Queue(QueueError::Panicked { operation, message })) => {
                assert_eq!(operation, "panicking");
                assert_eq!(message, "unit exploded");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
        assert_eq!(next.await.unwrap(), 7);
        assert_eq!(queue.metrics().total_panicked, 1);
    }

    /// Validates that `idle` waits for earlier units only.
    ///
    /// Assertions:
    /// - Confirms both earlier units completed when idle resolves.
    /// - Confirms a unit enqueued after the idle marker has not completed.
    #[tokio::test]
    async fn test_idle_waits_for_prior_units_only() {
        let queue = queue();
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [20_u64, 5] {
            let done = Arc::clone(&done);
            let pending = queue.enqueue("work", move || async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UnitError>(())
            });
            drop(pending);
        }

        let idle = queue.idle();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let later = queue.enqueue("later", move || async move {
            let _ = release_rx.await;
            Ok::<_, UnitError>(())
        });

        idle.await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(queue.metrics().depth(), 1);

        release_tx.send(()).unwrap();
        later.await.unwrap();
    }

    /// Validates that dropping a failed unit's `Pending` reports it exactly
    /// once, whether dropped before or after the unit ran.
    #[tokio::test]
    async fn test_unobserved_failures_are_reported_once() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let config = {
            let reports = Arc::clone(&reports);
            QueueConfig::new("unobserved").with_reporter(move |failure| {
                reports.lock().push(format!("{}: {}", failure.operation, failure.error));
            })
        };
        let queue = SerialQueue::new(config).unwrap();

        // Dropped before the unit runs: the worker reports.
        drop(queue.enqueue("early", || async { Err::<(), _>(UnitError::Failed("early")) }));

        // Dropped after the unit ran: Pending::drop reports.
        let late = queue.enqueue("late", || async { Err::<(), _>(UnitError::Failed("late")) });
        queue.idle().await;
        drop(late);

        // Observed failures are not reported.
        let seen = queue.enqueue("seen", || async { Err::<(), _>(UnitError::Failed("seen")) });
        assert!(seen.await.is_err());

        queue.idle().await;
        let reports = reports.lock().clone();
        assert_eq!(reports, vec!["early: unit failed: early", "late: unit failed: late"]);
        assert_eq!(queue.metrics().total_unobserved, 2);
    }

    #[test]
    fn test_new_without_runtime_fails() {
        let result = SerialQueue::new(QueueConfig::default());
        assert!(matches!(result, Err(QueueError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = SerialQueue::new(QueueConfig::new(""));
        assert!(matches!(result, Err(QueueError::Common(CommonError::Config { .. }))));
    }
}
