//! Test fixtures for lifecycle integration tests
#![allow(dead_code)]
//!
//! - [`CallLog`] - ordered record of constructor and destructor calls
//! - [`tracked`] / [`delayed`] - descriptors that write to a [`CallLog`]
//! - [`init_tracing`] - test-writer subscriber, filtered by `RUST_LOG`

use std::fmt::Debug;
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use raii_scope::{BoxError, Descriptor};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a fmt subscriber that writes through the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Shared, ordered log of lifecycle events
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Events starting with `prefix`, in order
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.events.lock().iter().filter(|e| e.starts_with(prefix)).cloned().collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Poll until `event` shows up or `timeout` elapses
    pub async fn wait_for(&self, event: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.count(event) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.count(event) > 0
    }
}

/// Synchronously constructed resource that logs `create:{id}` and
/// `destroy:{id}={value:?}`
pub fn tracked<T>(log: &CallLog, id: &str, value: T) -> Descriptor<(), T>
where
    T: Debug + Send + Sync + 'static,
{
    let (create_log, destroy_log) = (log.clone(), log.clone());
    let (create_id, destroy_id) = (id.to_string(), id.to_string());

    Descriptor::ready(move |_: &()| {
        create_log.record(format!("create:{create_id}"));
        Ok::<_, BoxError>(value)
    })
    .id(id)
    .destructor_fn(move |value: Arc<T>| {
        destroy_log.record(format!("destroy:{destroy_id}={value:?}"));
        Ok::<_, BoxError>(())
    })
}

/// Resource whose constructor sleeps for `delay`; logs `create:start:{id}`,
/// `create:end:{id}` and `destroy:{id}={value:?}`
pub fn delayed<T>(log: &CallLog, id: &str, value: T, delay: Duration) -> Descriptor<(), T>
where
    T: Debug + Send + Sync + 'static,
{
    let (create_log, destroy_log) = (log.clone(), log.clone());
    let (create_id, destroy_id) = (id.to_string(), id.to_string());

    Descriptor::new(move |_: Arc<()>| async move {
        create_log.record(format!("create:start:{create_id}"));
        tokio::time::sleep(delay).await;
        create_log.record(format!("create:end:{create_id}"));
        Ok::<_, BoxError>(value)
    })
    .id(id)
    .destructor_fn(move |value: Arc<T>| {
        destroy_log.record(format!("destroy:{destroy_id}={value:?}"));
        Ok::<_, BoxError>(())
    })
}
