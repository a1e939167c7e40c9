//! Resource descriptors handed to [`Scope::create`](super::Scope::create)

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::id::ResourceId;
use crate::error::{BoxError, CommonError};

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

pub(crate) type Constructor<H, T> =
    Box<dyn FnOnce(Arc<H>) -> BoxFuture<'static, Result<T, BoxError>> + Send>;

pub(crate) type ErasedDestructor =
    Box<dyn FnOnce(ErasedValue) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

type Destructor<T> = Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Asynchronous teardown for resources that know how to release themselves
///
/// Used by [`Descriptor::managed`].
#[async_trait]
pub trait Teardown: Send + Sync + 'static {
    /// Release the resource
    async fn teardown(&self) -> Result<(), BoxError>;
}

/// How to build (and optionally tear down) one resource of type `T`
///
/// The constructor receives the scope's host context. Construction is
/// deferred: nothing runs until the scope's queue reaches the unit.
///
/// ```rust,ignore
/// let pool = Descriptor::new(|host: Arc<App>| async move { Pool::connect(&host.dsn).await })
///     .id("pool")
///     .destructor(|pool| async move { pool.close().await });
/// ```
#[must_use]
pub struct Descriptor<H, T> {
    id: Option<ResourceId>,
    constructor: Constructor<H, T>,
    destructor: Option<Destructor<T>>,
    _host: PhantomData<fn(Arc<H>)>,
}

impl<H, T> Descriptor<H, T>
where
    H: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Describe a resource built by an asynchronous constructor
    pub fn new<F, Fut, E>(constructor: F) -> Self
    where
        F: FnOnce(Arc<H>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_constructor(Box::new(move |host: Arc<H>| {
            async move { constructor(host).await.map_err(Into::into) }.boxed()
        }))
    }

    /// Describe a resource built by a synchronous constructor
    pub fn ready<F, E>(constructor: F) -> Self
    where
        F: FnOnce(&H) -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_constructor(Box::new(move |host: Arc<H>| {
            futures::future::ready(constructor(&*host).map_err(Into::into)).boxed()
        }))
    }

    /// Describe an already-built value
    pub fn value(value: T) -> Self {
        Self::from_constructor(Box::new(move |_: Arc<H>| futures::future::ready(Ok(value)).boxed()))
    }

    fn from_constructor(constructor: Constructor<H, T>) -> Self {
        Self { id: None, constructor, destructor: None, _host: PhantomData }
    }

    /// Register the resource under `id`
    pub fn id<I: Into<ResourceId>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Tear the resource down with an asynchronous destructor
    pub fn destructor<F, Fut, E>(mut self, destructor: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.destructor = Some(Box::new(move |value: Arc<T>| {
            async move { destructor(value).await.map_err(Into::into) }.boxed()
        }));
        self
    }

    /// Tear the resource down with a synchronous destructor
    pub fn destructor_fn<F, E>(mut self, destructor: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.destructor = Some(Box::new(move |value: Arc<T>| {
            futures::future::ready(destructor(value).map_err(Into::into)).boxed()
        }));
        self
    }

    /// Whether a destructor was supplied
    pub fn has_destructor(&self) -> bool {
        self.destructor.is_some()
    }

    /// Split into id, constructor and a type-erased destructor
    pub(crate) fn into_parts(self) -> (Option<ResourceId>, Constructor<H, T>, Option<ErasedDestructor>) {
        let destructor = self.destructor.map(|destructor| -> ErasedDestructor {
            Box::new(move |value: ErasedValue| match value.downcast::<T>() {
                Ok(typed) => destructor(typed),
                Err(_) => futures::future::ready(Err(BoxError::from(CommonError::internal(format!(
                    "resource is not a {}",
                    std::any::type_name::<T>()
                )))))
                .boxed(),
            })
        });
        (self.id, self.constructor, destructor)
    }
}

impl<H, T> Descriptor<H, T>
where
    H: Send + Sync + 'static,
    T: Teardown,
{
    /// Describe a resource whose [`Teardown`] impl is its destructor
    pub fn managed<F, Fut, E>(constructor: F) -> Self
    where
        F: FnOnce(Arc<H>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::new(constructor).destructor(|value: Arc<T>| async move { value.teardown().await })
    }
}

impl<H, T> fmt::Debug for Descriptor<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("resource", &std::any::type_name::<T>())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}
