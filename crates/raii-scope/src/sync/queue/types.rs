use std::fmt;
use std::sync::Arc;

use crate::observability::{UnobservedFailure, UnobservedFailureHook};

/// Label used when a queue is created without one
pub const DEFAULT_QUEUE_LABEL: &str = "scope";

/// Serial queue configuration
#[derive(Clone)]
pub struct QueueConfig {
    /// Label attached to every log event and unobserved failure report
    pub label: String,
    /// Queue-local unobserved failure reporter; falls back to the process-wide
    /// hook when unset
    pub reporter: Option<UnobservedFailureHook>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { label: DEFAULT_QUEUE_LABEL.to_string(), reporter: None }
    }
}

impl QueueConfig {
    /// Create a configuration with the given label
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self { label: label.into(), reporter: None }
    }

    /// Attach a queue-local unobserved failure reporter
    pub fn with_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&UnobservedFailure<'_>) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.label.trim().is_empty() {
            return Err("Queue label must not be empty".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("label", &self.label)
            .field("reporter", &self.reporter.as_ref().map(|_| "<hook>"))
            .finish()
    }
}
