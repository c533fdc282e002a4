//! Error types for the scatter-gather engine.
//!
//! The central [`Error`] enum captures every way a run can fail to deliver an
//! aggregate. Per-item failures are *not* errors at this level: they are
//! [`Outcome::Failure`](crate::Outcome::Failure) values, and only surface
//! here as the terminal cause of a fail-fast run.

/// Boxed error returned by an aggregate's combine or finalize step.
pub type CombineError = Box<dyn core::error::Error + Send + Sync>;

/// Unified error type for scatter-gather runs.
///
/// `E` is the error type of the work unit driving the run.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error<E> {
    /// The configured concurrency limit admits no work at all.
    ///
    /// Raised synchronously by [`ScatterGather::run`](crate::ScatterGather::run)
    /// before any work unit is spawned.
    #[error("concurrency limit must be at least 1 (got {limit})")]
    InvalidConcurrency { limit: usize },

    /// A work unit reported a failure while the run was fail-fast.
    ///
    /// Carries the cause of the first failure to settle; later settlements
    /// are discarded.
    #[error("work unit failed: {0}")]
    WorkUnit(E),

    /// A work unit panicked. The panic is captured at the invoker boundary
    /// and carried here as its payload message; it never unwinds through
    /// the engine. Always terminal, under either failure policy.
    #[error("work unit panicked: {0}")]
    WorkUnitPanic(String),

    /// The aggregate's combine or finalize step failed (or panicked).
    ///
    /// Once folding fails the aggregate's integrity is unknown, so this is
    /// terminal regardless of the failure policy.
    #[error("aggregation failed: {0}")]
    Aggregation(#[source] CombineError),

    /// The run ended without reporting a result.
    ///
    /// Only observable when the execution context stops driving the run's
    /// coordinator, e.g. a spawner that drops tasks or a runtime shutting
    /// down mid-run.
    #[error("run terminated without reporting a result")]
    Disconnected,
}

/// Extracts a printable message from a captured panic payload.
pub(crate) fn panic_message(payload: Box<dyn core::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "opaque panic payload".to_string(),
        },
    }
}
