//! Entry point for scatter-gather runs.
//!
//! This module defines [`ScatterGather`], the engine's public surface. A
//! configured engine is cheap to keep around and reusable: each call to
//! [`ScatterGather::run`] starts an independent run with its own aggregate,
//! cancellation token, settlement channel, and counters. No state crosses
//! runs except the execution context the caller supplied.
//!
//! ## Responsibilities
//!
//! - Validate configuration before any work unit is spawned.
//! - Stamp the run's start instant and build its plumbing.
//! - Spawn the driver onto the run's execution context.
//! - Hand the caller a [`RunHandle`] that resolves on the terminal state.

use crate::engine::dispatcher::{Driver, FoldSink};
use crate::engine::invoker::LockedFold;
use crate::mutex::Mutex;
use crate::run::{RunHandle, RunMetrics};
use crate::{Aggregate, Clock, Error, FailurePolicy, FoldStrategy, Spawn, WorkUnit};
#[cfg(feature = "async-tokio")]
use crate::{MonotonicClock, TokioSpawn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Bounded-concurrency scatter-gather engine.
///
/// Given an ordered sequence of input items, a [`WorkUnit`] and an
/// [`Aggregate`], a run fans the work units out over the execution context
/// with at most `limit` in flight at any instant, folds each outcome as it
/// settles, and resolves the returned [`RunHandle`] with the finalized
/// aggregate and the run's elapsed wall-clock time.
///
/// A limit of 1 degenerates to strict sequential execution; a limit at or
/// above the item count degenerates to full parallelism. The limit bounds
/// *admitted* work units, not runtime workers: a small worker pool serving
/// a larger window shows up as queuing delay inside the elapsed time, which
/// is exactly what the engine is meant to make visible.
///
/// # Example
///
/// ```
/// use muster::{Fold, Outcome, ScatterGather};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let engine = ScatterGather::new(4);
///
///     let handle = engine
///         .run(
///             0..16u64,
///             |item: u64| async move { Ok::<_, String>(item * item) },
///             Fold::new(0u64, |acc: &mut u64, outcome: Outcome<u64, String>| {
///                 if let Outcome::Success(value) = outcome {
///                     *acc += value;
///                 }
///                 Ok(())
///             }),
///         )
///         .unwrap();
///
///     let report = handle.await.unwrap();
///     assert_eq!(report.aggregate, 1240);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScatterGather<S, C> {
    spawner: S,
    clock: C,
    limit: usize,
    policy: FailurePolicy,
    fold: FoldStrategy,
}

#[cfg(feature = "async-tokio")]
impl ScatterGather<TokioSpawn, MonotonicClock> {
    /// Creates an engine on the ambient Tokio runtime with the monotonic
    /// clock, fail-fast policy and confined folding.
    pub const fn new(limit: usize) -> Self {
        Self::with_runtime(limit, TokioSpawn, MonotonicClock)
    }
}

impl<S, C> ScatterGather<S, C>
where
    S: Spawn + Clone,
    C: Clock + Clone,
{
    /// Creates an engine over an explicit execution context.
    ///
    /// The spawner and clock are per-run collaborators rather than ambient
    /// globals, so tests can substitute a virtualized clock (see
    /// [`TokioClock`](crate::TokioClock)) or a misbehaving spawner.
    pub const fn with_runtime(limit: usize, spawner: S, clock: C) -> Self {
        Self {
            spawner,
            clock,
            limit,
            policy: FailurePolicy::FailFast,
            fold: FoldStrategy::Confined,
        }
    }

    /// Sets what a run does when a work unit reports a failure.
    pub const fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how settled outcomes reach the aggregate.
    pub const fn fold_strategy(mut self, fold: FoldStrategy) -> Self {
        self.fold = fold;
        self
    }

    /// Starts one run and returns its handle.
    ///
    /// Returns immediately; the caller is never blocked on admission or
    /// aggregation. An empty input completes the run with the aggregate's
    /// zero value.
    ///
    /// # Errors
    ///
    /// Fails synchronously with [`Error::InvalidConcurrency`], before any
    /// work unit is spawned, if the configured limit is zero.
    pub fn run<It, W, A>(
        &self,
        items: It,
        work: W,
        aggregate: A,
    ) -> Result<RunHandle<A::Output, W::Err>, Error<W::Err>>
    where
        It: IntoIterator,
        It::IntoIter: Send + 'static,
        It::Item: Send + 'static,
        W: WorkUnit<It::Item>,
        A: Aggregate<W::Ok, W::Err>,
    {
        if self.limit == 0 {
            return Err(Error::InvalidConcurrency { limit: self.limit });
        }

        let metrics = Arc::new(RunMetrics::default());
        let (report_tx, report_rx) = oneshot::channel();
        // Each in-flight unit posts at most one settlement, so a
        // window-sized buffer means senders never wait.
        let (settlement_tx, settlement_rx) = mpsc::channel(self.limit);

        let sink = match self.fold {
            FoldStrategy::Confined => FoldSink::Confined { aggregate },
            FoldStrategy::Locked => FoldSink::Locked {
                shared: Arc::new(Mutex::new(LockedFold {
                    aggregate: Some(aggregate),
                    sealed: false,
                })),
            },
        };

        let driver: Driver<_, _, A, _, _> = Driver {
            items: items.into_iter(),
            work: Arc::new(work),
            limit: self.limit,
            policy: self.policy,
            spawner: self.spawner.clone(),
            clock: self.clock.clone(),
            started: self.clock.now(),
            cancel: CancellationToken::new(),
            metrics: Arc::clone(&metrics),
            settlement_tx,
            settlement_rx,
            in_flight: 0,
            _aggregate: std::marker::PhantomData,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(limit = self.limit, policy = ?self.policy, "run started");

        self.spawner.spawn(driver.drive(sink, report_tx));

        Ok(RunHandle::new(report_rx, metrics))
    }
}
