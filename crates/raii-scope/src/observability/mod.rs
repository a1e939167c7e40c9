//! Observability hooks for lifecycle units
//!
//! Failures of user code are delivered to the caller that issued the
//! operation. When that caller drops the returned future without awaiting it,
//! the failure would otherwise vanish; instead it is routed to an
//! "unobserved failure" reporter:
//!
//! 1. the reporter configured on the owning queue, if any
//! 2. otherwise the process-wide hook set with [`set_unobserved_failure_hook`]
//! 3. otherwise a `tracing::error!` event
//!
//! The process-wide hook mirrors `std::panic::set_hook`: last writer wins.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

/// A failure that no caller observed
pub struct UnobservedFailure<'a> {
    /// Label of the queue (scope) the unit belonged to
    pub queue: &'a str,
    /// Operation name of the failed unit (`"create"`, `"destroy"`, ...)
    pub operation: &'static str,
    /// The error the unit resolved to
    pub error: &'a (dyn Error + Send + Sync + 'static),
}

impl fmt::Debug for UnobservedFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnobservedFailure")
            .field("queue", &self.queue)
            .field("operation", &self.operation)
            .field("error", &self.error.to_string())
            .finish()
    }
}

/// Callback invoked for unobserved failures
pub type UnobservedFailureHook = Arc<dyn Fn(&UnobservedFailure<'_>) + Send + Sync + 'static>;

static GLOBAL_HOOK: Lazy<RwLock<Option<UnobservedFailureHook>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide unobserved failure hook, replacing any previous
/// one
pub fn set_unobserved_failure_hook<F>(hook: F)
where
    F: Fn(&UnobservedFailure<'_>) + Send + Sync + 'static,
{
    *GLOBAL_HOOK.write() = Some(Arc::new(hook));
}

/// Remove and return the process-wide unobserved failure hook
pub fn take_unobserved_failure_hook() -> Option<UnobservedFailureHook> {
    GLOBAL_HOOK.write().take()
}

/// Route an unobserved failure through the reporter chain
pub(crate) fn report_unobserved(local: Option<&UnobservedFailureHook>, failure: &UnobservedFailure<'_>) {
    if let Some(hook) = local {
        hook(failure);
        return;
    }

    // Clone out of the lock so a hook may replace itself.
    let global = GLOBAL_HOOK.read().clone();
    match global {
        Some(hook) => hook(failure),
        None => error!(
            queue = failure.queue,
            operation = failure.operation,
            error = %failure.error,
            "unobserved_lifecycle_failure"
        ),
    }
}

/// Log the outcome of a finished queue unit with structured fields
#[inline]
pub(crate) fn log_unit_outcome(queue: &str, operation: &'static str, elapsed: Duration, success: bool) {
    let duration_ms = elapsed.as_millis() as u64;

    if success {
        debug!(queue, operation, duration_ms, "lifecycle_unit_success");
    } else {
        warn!(queue, operation, duration_ms, "lifecycle_unit_failure");
    }
}
