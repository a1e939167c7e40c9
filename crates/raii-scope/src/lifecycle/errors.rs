use thiserror::Error;

use super::id::ResourceId;
use crate::error::{CommonError, ErrorSeverity, Failure};
use crate::sync::queue::QueueError;

/// Lifecycle operation errors
///
/// `Clone` so a single constructor failure can be handed to every caller
/// waiting on the same resource.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Resource id '{0}' is already claimed in this scope")]
    DuplicateId(ResourceId),

    #[error("Resource '{0}' does not exist or is being destroyed")]
    ResourceNotFound(ResourceId),

    #[error("Resource '{id}' holds a {actual}, not a {expected}")]
    TypeMismatch { id: ResourceId, expected: &'static str, actual: &'static str },

    #[error("Constructor for {} failed: {source}", display_target(.id))]
    ConstructorFailure { id: Option<ResourceId>, source: Failure },

    #[error("Destructor for {} failed: {source}", display_target(.id))]
    DestructorFailure { id: Option<ResourceId>, source: Failure },

    #[error("Scope has been torn down")]
    InstanceTornDown,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

fn display_target(id: &Option<ResourceId>) -> String {
    match id {
        Some(id) => format!("'{id}'"),
        None => "anonymous resource".to_string(),
    }
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl LifecycleError {
    /// The user failure behind a constructor or destructor error
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::ConstructorFailure { source, .. } | Self::DestructorFailure { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Id the error refers to, when it refers to one
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::DuplicateId(id) | Self::ResourceNotFound(id) | Self::TypeMismatch { id, .. } => {
                Some(id)
            }
            Self::ConstructorFailure { id, .. } | Self::DestructorFailure { id, .. } => id.as_ref(),
            _ => None,
        }
    }
}

impl_error_classification!(LifecycleError, Common,
    Self::DuplicateId(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::ResourceNotFound(_) => {
        retryable: false,
        severity: ErrorSeverity::Info,
        critical: false,
    },
    Self::TypeMismatch { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::ConstructorFailure { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::DestructorFailure { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::InstanceTornDown => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Queue(e) => {
        retryable: e.is_retryable(),
        severity: e.severity(),
        critical: e.is_critical(),
    }
);
