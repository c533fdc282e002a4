use crate::aggregate::{finish_guarded, fold_guarded};
use crate::engine::invoker::{FoldMode, LockedFold, Settlement, invoke_one};
use crate::mutex::{Mutex, lock};
use crate::run::{RunFailure, RunMetrics, RunReport, RunResult};
use crate::{Aggregate, Clock, CombineError, Error, FailurePolicy, Outcome, Spawn, WorkUnit};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Where the run's aggregate lives while work units settle.
pub(super) enum FoldSink<A> {
    /// The driver owns the aggregate and folds every outcome itself.
    Confined { aggregate: A },
    /// The aggregate is shared with work units, which fold under the lock.
    Locked { shared: Arc<Mutex<LockedFold<A>>> },
}

impl<A> FoldSink<A> {
    fn fold<T, E>(&mut self, outcome: Outcome<T, E>) -> Result<(), CombineError>
    where
        A: Aggregate<T, E>,
    {
        match self {
            Self::Confined { aggregate } => fold_guarded(aggregate, outcome),
            Self::Locked { shared } => {
                let mut state = lock(shared);
                if state.sealed {
                    return Ok(());
                }
                match state.aggregate.as_mut() {
                    Some(aggregate) => fold_guarded(aggregate, outcome),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Drives one run to its terminal state.
///
/// The driver is the run's single coordinator: it admits items in input
/// order while keeping the in-flight window at or below the concurrency
/// limit, consumes settlements from one ordered channel, folds outcomes
/// (or accepts fold credits), and performs the terminal transition exactly
/// once. Admission is credit-based: every settlement received frees one
/// slot and immediately admits the next pending item, so the limit bounds
/// concurrency at every instant, not in batches.
pub(super) struct Driver<It, W, A, S, C>
where
    It: Iterator,
    It::Item: Send + 'static,
    W: WorkUnit<It::Item>,
    A: Aggregate<W::Ok, W::Err>,
    S: Spawn,
    C: Clock,
{
    pub(super) items: It,
    pub(super) work: Arc<W>,
    pub(super) limit: usize,
    pub(super) policy: FailurePolicy,
    pub(super) spawner: S,
    pub(super) clock: C,
    pub(super) started: C::Instant,
    pub(super) cancel: CancellationToken,
    pub(super) metrics: Arc<RunMetrics>,
    pub(super) settlement_tx: mpsc::Sender<Settlement<W::Ok, W::Err>>,
    pub(super) settlement_rx: mpsc::Receiver<Settlement<W::Ok, W::Err>>,
    pub(super) in_flight: usize,
    pub(super) _aggregate: PhantomData<A>,
}

impl<It, W, A, S, C> Driver<It, W, A, S, C>
where
    It: Iterator,
    It::Item: Send + 'static,
    W: WorkUnit<It::Item>,
    A: Aggregate<W::Ok, W::Err>,
    S: Spawn,
    C: Clock,
{
    /// Runs to a terminal state and reports the result through the handle.
    pub(super) async fn drive(
        mut self,
        sink: FoldSink<A>,
        report_tx: oneshot::Sender<RunResult<A::Output, W::Err>>,
    ) {
        let verdict = self.run_to_terminal(sink).await;
        let elapsed = self.clock.elapsed(self.started);

        let result = match verdict {
            Ok(aggregate) => Ok(RunReport { aggregate, elapsed }),
            Err(cause) => Err(RunFailure { cause, elapsed }),
        };

        if report_tx.send(result).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("run result dropped: handle released before completion");
        }
    }

    async fn run_to_terminal(&mut self, mut sink: FoldSink<A>) -> Result<A::Output, Error<W::Err>> {
        // Seed the window in input order.
        while self.in_flight < self.limit {
            if !self.admit_next(&sink) {
                break;
            }
        }

        while self.in_flight > 0 {
            let settlement = match self.settlement_rx.recv().await {
                Some(settlement) => settlement,
                // Cannot happen while the driver holds its own sender; fail
                // closed rather than hang.
                None => return Err(Error::Disconnected),
            };
            self.in_flight -= 1;

            match self.apply(settlement, &mut sink) {
                Ok(()) => {}
                Err(cause) => {
                    self.fail(&sink);
                    return Err(cause);
                }
            }

            self.admit_next(&sink);
        }

        // Every admitted item is accounted for: finalize exactly once.
        match sink {
            FoldSink::Confined { aggregate } => {
                finish_guarded::<A, W::Ok, W::Err>(aggregate).map_err(Error::Aggregation)
            }
            FoldSink::Locked { shared } => {
                let taken = {
                    let mut state = lock(&shared);
                    state.sealed = true;
                    state.aggregate.take()
                };
                match taken {
                    Some(aggregate) => {
                        finish_guarded::<A, W::Ok, W::Err>(aggregate).map_err(Error::Aggregation)
                    }
                    // Only this path takes the aggregate; never expected.
                    None => Err(Error::Aggregation("aggregate state already taken".into())),
                }
            }
        }
    }

    /// Admits the next pending item, if any, spawning its work unit.
    fn admit_next(&mut self, sink: &FoldSink<A>) -> bool {
        let Some(item) = self.items.next() else {
            return false;
        };

        self.in_flight += 1;
        self.metrics.on_admitted();

        let mode = match sink {
            FoldSink::Confined { .. } => FoldMode::Confined,
            FoldSink::Locked { shared } => FoldMode::Locked(Arc::clone(shared)),
        };

        self.spawner.spawn(invoke_one(
            item,
            Arc::clone(&self.work),
            mode,
            self.policy,
            self.settlement_tx.clone(),
            self.cancel.clone(),
            Arc::clone(&self.metrics),
        ));

        true
    }

    /// Applies one settlement; an error here is the run's terminal cause.
    fn apply(
        &mut self,
        settlement: Settlement<W::Ok, W::Err>,
        sink: &mut FoldSink<A>,
    ) -> Result<(), Error<W::Err>> {
        match (self.policy, settlement) {
            (FailurePolicy::FailFast, Settlement::Outcome(Outcome::Failure(cause))) => {
                Err(Error::WorkUnit(cause))
            }
            (_, Settlement::Outcome(outcome)) => {
                sink.fold(outcome).map_err(Error::Aggregation)?;
                self.metrics.on_folded();
                Ok(())
            }
            (_, Settlement::Folded) => {
                self.metrics.on_folded();
                Ok(())
            }
            (_, Settlement::Failed(cause)) => Err(Error::WorkUnit(cause)),
            (_, Settlement::FoldFailed(err)) => Err(Error::Aggregation(err)),
            (_, Settlement::Panicked(message)) => Err(Error::WorkUnitPanic(message)),
        }
    }

    /// The failing terminal transition: stop folds, then cancel
    /// outstanding work.
    fn fail(&self, sink: &FoldSink<A>) {
        if let FoldSink::Locked { shared } = sink {
            lock(shared).sealed = true;
        }
        self.cancel.cancel();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            outstanding = self.in_flight,
            "run failed; cancelling outstanding work units"
        );
    }
}
