//! Resource identifiers

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

/// Key under which a resource is registered in a scope
///
/// `Named` ids compare by string content. `Unique` ids come from
/// [`ResourceId::unique`] and never collide with any other id, named or
/// unique, so independent call sites can each hold a private key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Named(Arc<str>),
    Unique(u64),
}

impl ResourceId {
    /// Create a named id
    pub fn named<S: AsRef<str>>(name: S) -> Self {
        Self::Named(Arc::from(name.as_ref()))
    }

    /// Mint a process-unique id
    pub fn unique() -> Self {
        Self::Unique(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed))
    }

    /// Name of a `Named` id
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Unique(_) => None,
        }
    }

    /// Human-readable form used in log fields
    pub(crate) fn log_repr(&self) -> Cow<'_, str> {
        match self {
            Self::Named(name) => Cow::Borrowed(name),
            Self::Unique(n) => Cow::Owned(format!("#{n}")),
        }
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "ResourceId({name:?})"),
            Self::Unique(n) => write!(f, "ResourceId(#{n})"),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.log_repr())
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self::Named(Arc::from(name))
    }
}

impl From<&String> for ResourceId {
    fn from(name: &String) -> Self {
        Self::named(name)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}
