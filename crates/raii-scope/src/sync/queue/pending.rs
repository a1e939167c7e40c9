use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::core::QueueShared;
use super::errors::QueueError;

/// Result of a queued unit, resolved once the unit has run
///
/// The unit is already scheduled when a `Pending` is handed out; awaiting it
/// only observes the outcome. Dropping a `Pending` whose unit failed (or will
/// fail) routes the error to the unobserved failure reporter instead of
/// discarding it.
#[must_use = "dropping a Pending reports its failure as unobserved"]
pub struct Pending<T, E>
where
    E: Error + Send + Sync + 'static,
{
    rx: Option<oneshot::Receiver<Result<T, E>>>,
    shared: Arc<QueueShared>,
    operation: &'static str,
}

impl<T, E> Pending<T, E>
where
    E: Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<T, E>>,
        shared: Arc<QueueShared>,
        operation: &'static str,
    ) -> Self {
        Self { rx: Some(rx), shared, operation }
    }

    /// Operation name of the underlying unit
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl<T, E> Future for Pending<T, E>
where
    E: Error + Send + Sync + From<QueueError> + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(Err(E::from(QueueError::Closed)));
        };

        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.rx = None;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.rx = None;
                Poll::Ready(Err(E::from(QueueError::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for Pending<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            // After close() a late send fails and the worker reports instead.
            rx.close();
            if let Ok(Err(err)) = rx.try_recv() {
                self.shared.report_unobserved(self.operation, &err);
            }
        }
    }
}

impl<T, E> fmt::Debug for Pending<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("queue", &self.shared.label())
            .field("operation", &self.operation)
            .field("settled", &self.rx.is_none())
            .finish()
    }
}
