//! Lifecycle record for one managed resource

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use super::descriptor::{ErasedDestructor, ErasedValue};
use super::id::ResourceId;
use crate::error::{CommonError, Failure};

type Settlement = Option<Result<ErasedValue, Failure>>;

/// One resource's lifecycle record, shared by `ordered` and `by_id`
///
/// The settlement cell is written exactly once by the create unit. The
/// `pending_destroy` flag is the only state touched outside the queue; it
/// only ever goes from `false` to `true`.
pub(crate) struct Entry {
    seq: u64,
    id: Option<ResourceId>,
    type_id: TypeId,
    type_name: &'static str,
    destructor: Mutex<Option<ErasedDestructor>>,
    settlement: watch::Sender<Settlement>,
    pending_destroy: AtomicBool,
}

impl Entry {
    pub(crate) fn new<T: 'static>(
        seq: u64,
        id: Option<ResourceId>,
        destructor: Option<ErasedDestructor>,
    ) -> Self {
        let (settlement, _) = watch::channel(None);
        Self {
            seq,
            id,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            destructor: Mutex::new(destructor),
            settlement,
            pending_destroy: AtomicBool::new(false),
        }
    }

    /// Allocation order within the owning registry
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    pub(crate) fn holds<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Flag the entry for destruction; returns `true` on the first call only
    pub(crate) fn mark_pending_destroy(&self) -> bool {
        !self.pending_destroy.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_pending_destroy(&self) -> bool {
        self.pending_destroy.load(Ordering::Acquire)
    }

    /// Record the constructor outcome and wake every waiter
    pub(crate) fn settle(&self, outcome: Result<ErasedValue, Failure>) {
        self.settlement.send_replace(Some(outcome));
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settlement.borrow().is_some()
    }

    /// Wait for the constructor outcome
    pub(crate) async fn settled(&self) -> Result<ErasedValue, Failure> {
        let mut rx = self.settlement.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone(),
            Err(_) => None,
        };

        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        outcome.unwrap_or_else(|| {
            Err(Failure::new(CommonError::internal_with_context(
                "settlement channel closed before the constructor finished",
                "lifecycle_entry",
            )))
        })
    }

    /// Take the destructor; `None` if absent or already taken
    pub(crate) fn take_destructor(&self) -> Option<ErasedDestructor> {
        self.destructor.lock().take()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("seq", &self.seq)
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("settled", &self.is_settled())
            .field("pending_destroy", &self.is_pending_destroy())
            .finish_non_exhaustive()
    }
}
