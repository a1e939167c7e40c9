use thiserror::Error;

use crate::error::{CommonError, ErrorSeverity};

/// Serial queue errors
///
/// A queue error never describes the failure of user code; those travel
/// through the unit's own error type. These variants only cover the queue
/// machinery itself.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("No tokio runtime is available to drive the queue worker")]
    NoRuntime,

    #[error("Queue worker is no longer running")]
    Closed,

    #[error("Unit '{operation}' panicked: {message}")]
    Panicked { operation: &'static str, message: String },
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

impl_error_classification!(QueueError, Common,
    Self::NoRuntime => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    },
    Self::Closed => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Panicked { .. } => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    }
);

impl From<QueueError> for CommonError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Common(e) => e,
            QueueError::NoRuntime => {
                CommonError::internal("No tokio runtime available for queue worker".to_string())
            }
            QueueError::Closed => CommonError::internal("Queue worker stopped".to_string()),
            QueueError::Panicked { operation, message } => {
                CommonError::internal_with_context(message, format!("queue_unit_{operation}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClassification;

    #[test]
    fn test_queue_error_classification() {
        let panicked = QueueError::Panicked { operation: "create", message: "boom".to_string() };
        assert!(panicked.is_critical());
        assert_eq!(panicked.to_string(), "Unit 'create' panicked: boom");

        assert!(!QueueError::Closed.is_retryable());
        assert_eq!(QueueError::Closed.severity(), ErrorSeverity::Error);
        assert_eq!(QueueError::NoRuntime.retry_after(), None);
    }

    #[test]
    fn test_queue_error_into_common() {
        let common: CommonError =
            QueueError::Panicked { operation: "destroy", message: "bad".to_string() }.into();
        assert_eq!(common.to_string(), "Internal error in 'queue_unit_destroy': bad");
    }
}
