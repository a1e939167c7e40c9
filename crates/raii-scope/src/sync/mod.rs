//! Serialized execution primitives
//!
//! ## Submodules
//!
//! - **`queue`**: single-worker FIFO queue whose units fail (or panic) in
//!   isolation, with an `idle()` drain barrier and unobserved failure
//!   reporting for dropped results

pub mod queue;

pub use queue::{
    Pending, QueueConfig, QueueError, QueueMetrics, QueueMetricsSnapshot, QueueResult, SerialQueue,
};
