use crate::aggregate::fold_guarded;
use crate::error::panic_message;
use crate::mutex::{Mutex, lock};
use crate::run::RunMetrics;
use crate::{Aggregate, CombineError, FailurePolicy, Outcome, WorkUnit};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where a settling work unit delivers its outcome.
pub(super) enum FoldMode<A> {
    /// Post the outcome over the settlement channel; the driver folds it.
    Confined,
    /// Fold in place under the shared lock, then post a credit.
    Locked(Arc<Mutex<LockedFold<A>>>),
}

/// Aggregate state shared with work units under
/// [`FoldStrategy::Locked`](crate::FoldStrategy::Locked).
///
/// `sealed` flips on the terminal transition; settlements that lose that
/// race are discarded instead of folded. The aggregate is taken out exactly
/// once, by the driver's finalize step.
pub(super) struct LockedFold<A> {
    pub(super) aggregate: Option<A>,
    pub(super) sealed: bool,
}

/// One settlement posted back to the driver.
///
/// Exactly one is produced per work unit that settles before cancellation;
/// cancelled units post nothing.
pub(super) enum Settlement<T, E> {
    /// Confined fold: the outcome itself, for the driver to fold.
    Outcome(Outcome<T, E>),
    /// Locked fold: the outcome was already folded in place.
    Folded,
    /// Locked fold, fail-fast: a failure cause that was deliberately not
    /// folded.
    Failed(E),
    /// The combine step failed or panicked.
    FoldFailed(CombineError),
    /// The work unit panicked; carries the panic message.
    Panicked(String),
}

/// Runs one work unit to settlement.
///
/// Spawned by the driver, once per admitted item. Races the work future
/// against the run's cancellation token: cancellation drops the future and
/// counts the unit as discarded. A settling unit converts its result (or
/// captured panic) into a [`Settlement`] and posts it; if the run reached a
/// terminal state first, the post fails and the settlement is discarded
/// with a log line rather than an error.
pub(super) async fn invoke_one<I, W, A>(
    item: I,
    work: Arc<W>,
    mode: FoldMode<A>,
    policy: FailurePolicy,
    settlements: mpsc::Sender<Settlement<W::Ok, W::Err>>,
    cancel: CancellationToken,
    metrics: Arc<RunMetrics>,
) where
    W: WorkUnit<I>,
    A: Aggregate<W::Ok, W::Err>,
{
    let work_fut = AssertUnwindSafe(work.invoke(item)).catch_unwind();
    let Some(result) = cancel.run_until_cancelled(work_fut).await else {
        metrics.on_settled();
        metrics.on_discarded();
        #[cfg(feature = "tracing")]
        tracing::trace!("work unit cancelled before settling");
        return;
    };
    metrics.on_settled();

    let settlement = match result {
        Ok(Ok(value)) => close_out(Outcome::Success(value), &mode, policy),
        Ok(Err(cause)) => close_out(Outcome::Failure(cause), &mode, policy),
        Err(payload) => Some(Settlement::Panicked(panic_message(payload))),
    };

    let Some(settlement) = settlement else {
        // Lost the race against the terminal transition.
        metrics.on_discarded();
        #[cfg(feature = "tracing")]
        tracing::debug!("outcome discarded after run termination");
        return;
    };

    if settlements.send(settlement).await.is_err() {
        metrics.on_discarded();
        #[cfg(feature = "tracing")]
        tracing::debug!("outcome discarded after run termination");
    }
}

fn close_out<T, E, A>(
    outcome: Outcome<T, E>,
    mode: &FoldMode<A>,
    policy: FailurePolicy,
) -> Option<Settlement<T, E>>
where
    A: Aggregate<T, E>,
{
    let shared = match mode {
        FoldMode::Confined => return Some(Settlement::Outcome(outcome)),
        FoldMode::Locked(shared) => shared,
    };

    // A fail-fast failure becomes the terminal cause; it is never folded.
    let outcome = match (policy, outcome) {
        (FailurePolicy::FailFast, Outcome::Failure(cause)) => {
            return Some(Settlement::Failed(cause));
        }
        (_, outcome) => outcome,
    };

    let mut state = lock(shared);
    if state.sealed {
        return None;
    }
    let Some(aggregate) = state.aggregate.as_mut() else {
        return None;
    };
    match fold_guarded(aggregate, outcome) {
        Ok(()) => Some(Settlement::Folded),
        Err(err) => Some(Settlement::FoldFailed(err)),
    }
}
