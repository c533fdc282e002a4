use core::future::Future;
#[cfg(feature = "async-tokio")]
use std::sync::Arc;

/// A unit of asynchronous computation bound to one input item.
///
/// Invoking a work unit produces exactly one settled result: `Ok` on
/// success, `Err` on failure. Whether the implementation is genuinely
/// non-blocking or wraps a blocking call is invisible to the engine; the
/// dispatcher only requires that `invoke` return control asynchronously.
///
/// Any `Fn(I) -> Future<Output = Result<T, E>>` implements this trait, so
/// plain `async fn`s and capturing closures work directly:
///
/// ```
/// use muster::WorkUnit;
///
/// async fn fetch(key: u64) -> Result<u64, String> {
///     Ok(key * 2)
/// }
///
/// # fn assert_unit(_: impl WorkUnit<u64>) {}
/// assert_unit(fetch);
/// ```
pub trait WorkUnit<I>: Send + Sync + 'static {
    /// Value produced on success.
    type Ok: Send + 'static;
    /// Cause reported on failure.
    type Err: Send + 'static;

    /// Starts the computation for one item.
    ///
    /// # Errors
    ///
    /// The returned future resolves to whatever the underlying operation
    /// reports; errors become failure outcomes, they are never propagated
    /// by unwinding.
    fn invoke(&self, item: I) -> impl Future<Output = Result<Self::Ok, Self::Err>> + Send;
}

impl<I, F, Fut, T, E> WorkUnit<I> for F
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send + 'static,
    E: Send + 'static,
{
    type Ok = T;
    type Err = E;

    fn invoke(&self, item: I) -> impl Future<Output = Result<T, E>> + Send {
        self(item)
    }
}

/// Adapts a synchronous, possibly-blocking operation into a [`WorkUnit`].
///
/// The closure runs on tokio's blocking pool via
/// [`tokio::task::spawn_blocking`], so a slow or blocking backend call never
/// occupies an async worker thread. The blocking pool is the external
/// resource bounding throughput here; the engine's concurrency limit still
/// caps how many of these are in flight at once.
#[cfg(feature = "async-tokio")]
pub struct Blocking<F> {
    op: Arc<F>,
}

#[cfg(feature = "async-tokio")]
impl<F> Blocking<F> {
    /// Wraps a synchronous operation.
    pub fn new(op: F) -> Self {
        Self { op: Arc::new(op) }
    }
}

#[cfg(feature = "async-tokio")]
impl<F> Clone for Blocking<F> {
    fn clone(&self) -> Self {
        Self {
            op: Arc::clone(&self.op),
        }
    }
}

#[cfg(feature = "async-tokio")]
impl<I, F, T, E> WorkUnit<I> for Blocking<F>
where
    I: Send + 'static,
    F: Fn(I) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Ok = T;
    type Err = E;

    fn invoke(&self, item: I) -> impl Future<Output = Result<T, E>> + Send {
        let op = Arc::clone(&self.op);
        async move {
            match tokio::task::spawn_blocking(move || op(item)).await {
                Ok(result) => result,
                // Resurface a panic from the blocking pool so the invoker
                // boundary captures it like any in-place panic.
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => panic!("blocking work unit aborted: {err}"),
            }
        }
    }
}
