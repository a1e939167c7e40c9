//! Per-instance resource lifecycle management.
//!
//! A [`Scope`] binds the construction and teardown of arbitrary, possibly
//! asynchronous resources to the lifetime of one hosting object:
//!
//! - all lifecycle operations of one scope run one at a time, in call order
//! - teardown visits resources in reverse order of successful construction
//! - `get` answers race-free while construction or destruction is in flight
//! - a failing (or panicking) constructor or destructor only fails its own
//!   call
//!
//! ```rust,ignore
//! let scope = Scope::new(app);
//! let pool = scope.create(Descriptor::new(|app| Pool::connect(app)).id("pool"))?.await?;
//! let same = scope.get::<Pool>("pool").await?;
//! scope.destroy_all().await?;
//! ```
//!
//! # Modules
//!
//! - `lifecycle`: the scope facade, descriptors and configuration
//! - `sync`: the single-worker serial queue every scope runs on
//! - `observability`: reporting of failures nobody awaited
//! - `error`: shared error types and classification

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[macro_use]
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod sync;

// Re-export commonly used types and traits for convenience
pub use error::{BoxError, CommonError, CommonResult, ErrorClassification, ErrorSeverity, Failure};
pub use lifecycle::{
    Descriptor, LifecycleError, LifecycleResult, ResourceId, Scope, ScopeBuilder, ScopeConfig,
    TeardownReport, Teardown,
};
pub use observability::{
    set_unobserved_failure_hook, take_unobserved_failure_hook, UnobservedFailure,
    UnobservedFailureHook,
};
pub use sync::{Pending, QueueConfig, QueueError, QueueMetricsSnapshot, SerialQueue};
