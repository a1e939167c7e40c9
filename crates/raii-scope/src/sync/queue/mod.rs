// Single-worker serial queue
// One unit at a time, FIFO by enqueue call, per-unit failure isolation

mod core;
mod errors;
pub mod metrics;
mod pending;
mod types;

pub use self::core::SerialQueue;
pub use self::errors::{QueueError, QueueResult};
pub use self::metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use self::pending::Pending;
pub use self::types::{QueueConfig, DEFAULT_QUEUE_LABEL};
