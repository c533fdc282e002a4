use crate::Error;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;
use pin_project_lite::pin_project;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// What a [`RunHandle`] resolves to: a report on completion, a failure with
/// its cause otherwise.
pub type RunResult<O, E> = Result<RunReport<O>, RunFailure<E>>;

/// A completed run.
#[derive(Debug)]
pub struct RunReport<O> {
    /// The finalized aggregate.
    pub aggregate: O,
    /// Wall-clock span from run creation to the terminal transition,
    /// inclusive of all scheduling and queuing delay.
    pub elapsed: Duration,
}

/// A failed run.
///
/// Only fail-fast runs fail on a work-unit failure; aggregation errors and
/// work-unit panics fail a run under either policy.
#[derive(thiserror::Error, Debug)]
#[error("run failed after {elapsed:?}: {cause}")]
pub struct RunFailure<E> {
    /// The terminal cause.
    pub cause: Error<E>,
    /// Wall-clock span from run creation up to the failure.
    pub elapsed: Duration,
}

/// Live counters for one run.
///
/// Counters are updated as the run progresses and are cheap enough to leave
/// on unconditionally; they exist so callers (and tests) can observe the
/// admission window from outside. All loads are relaxed: read them for
/// monitoring, not for synchronization.
#[derive(Debug, Default)]
pub struct RunMetrics {
    admitted: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    folded: AtomicU64,
    discarded: AtomicU64,
}

impl RunMetrics {
    pub(crate) fn on_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn on_settled(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn on_folded(&self) {
        self.folded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Items admitted (work unit spawned) so far.
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Work units currently executing.
    ///
    /// Never exceeds the run's concurrency limit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// High-water mark of [`in_flight`](RunMetrics::in_flight).
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Outcomes folded into the aggregate so far.
    pub fn folded(&self) -> u64 {
        self.folded.load(Ordering::Relaxed)
    }

    /// Settlements discarded because the run had already reached a terminal
    /// state (cancelled work, or outcomes arriving after a fail-fast
    /// failure).
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

pin_project! {
    /// Handle to an in-flight run.
    ///
    /// Returned immediately by
    /// [`ScatterGather::run`](crate::ScatterGather::run); the caller is
    /// never blocked on admission or aggregation. Awaiting the handle
    /// yields the run's terminal result. Dropping it detaches the run:
    /// outstanding work units keep executing, their result is logged and
    /// discarded.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct RunHandle<O, E> {
        #[pin]
        report: oneshot::Receiver<RunResult<O, E>>,
        metrics: Arc<RunMetrics>,
    }
}

impl<O, E> RunHandle<O, E> {
    pub(crate) fn new(report: oneshot::Receiver<RunResult<O, E>>, metrics: Arc<RunMetrics>) -> Self {
        Self { report, metrics }
    }

    /// Live counters for this run.
    ///
    /// The counters are shared with the run itself, so the returned handle
    /// stays readable after this future resolves.
    pub fn metrics(&self) -> Arc<RunMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<O, E> Future for RunHandle<O, E> {
    type Output = RunResult<O, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.report.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The coordinator vanished without reporting: its execution
            // context stopped driving it. Resolve rather than hang.
            Poll::Ready(Err(_)) => Poll::Ready(Err(RunFailure {
                cause: Error::Disconnected,
                elapsed: Duration::ZERO,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
