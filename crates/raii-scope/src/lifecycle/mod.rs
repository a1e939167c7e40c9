//! Resource lifecycle management bound to a hosting instance
//!
//! This module provides:
//! - **[`scope`]**: the per-instance facade (`create`, `get`, `destroy`,
//!   `destroy_all`)
//! - **[`descriptor`]**: how a resource is constructed and torn down
//! - **[`config`]**: scope configuration, loadable from TOML
//!
//! The registry and entry records are internal; they are only ever touched
//! through a [`Scope`].

pub mod config;
pub mod descriptor;
mod entry;
mod errors;
mod id;
mod registry;
pub mod scope;

// Re-export commonly used types for convenience
pub use config::{ScopeConfig, ScopeConfigBuilder};
pub use descriptor::{Descriptor, Teardown};
pub use errors::{LifecycleError, LifecycleResult};
pub use id::ResourceId;
pub use scope::{Scope, ScopeBuilder, TeardownReport};
