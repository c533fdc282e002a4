use crate::error::panic_message;
use crate::{CombineError, Outcome};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// The running combined result across all settled outcomes of one run.
///
/// An aggregate starts from its zero value, has one outcome folded in per
/// settled work unit via [`combine`](Aggregate::combine), and is finalized
/// exactly once via [`finish`](Aggregate::finish) when the run reaches its
/// terminal state. The engine serializes all `combine` calls, either by
/// confining them to the coordinator task or by locking around them (see
/// [`FoldStrategy`](crate::FoldStrategy)), so implementations never need
/// their own synchronization.
///
/// Outcomes arrive in completion order, which is unconstrained. If the
/// caller compares aggregates across runs with different concurrency
/// limits, the combine step must therefore be commutative; order-sensitive
/// accumulators like [`Collect`] are still valid, they just reflect arrival
/// order.
pub trait Aggregate<T, E>: Send + 'static {
    /// The finalized value handed to the caller on completion.
    type Output: Send + 'static;

    /// Folds one outcome into the accumulator.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the run: once a fold fails, the
    /// accumulator's integrity is unknown.
    fn combine(&mut self, outcome: Outcome<T, E>) -> Result<(), CombineError>;

    /// Freezes the accumulator into its final value.
    fn finish(self) -> Self::Output;
}

/// Closure-driven accumulator built from a zero value and a combine step.
///
/// This is the general-purpose [`Aggregate`]: any fold over outcomes can be
/// expressed as a starting value plus an `FnMut` that merges one outcome
/// into it.
///
/// ```
/// use muster::{CombineError, Fold, Outcome};
///
/// let summed = Fold::new(0u64, |acc: &mut u64, outcome: Outcome<u64, String>| {
///     if let Outcome::Success(value) = outcome {
///         *acc += value;
///     }
///     Ok::<_, CombineError>(())
/// });
/// # let _ = summed;
/// ```
pub struct Fold<Acc, F> {
    acc: Acc,
    combine: F,
}

impl<Acc, F> Fold<Acc, F> {
    /// Creates an accumulator from its zero value and combine closure.
    pub const fn new(zero: Acc, combine: F) -> Self {
        Self { acc: zero, combine }
    }
}

impl<T, E, Acc, F> Aggregate<T, E> for Fold<Acc, F>
where
    Acc: Send + 'static,
    F: FnMut(&mut Acc, Outcome<T, E>) -> Result<(), CombineError> + Send + 'static,
{
    type Output = Acc;

    fn combine(&mut self, outcome: Outcome<T, E>) -> Result<(), CombineError> {
        (self.combine)(&mut self.acc, outcome)
    }

    fn finish(self) -> Acc {
        self.acc
    }
}

/// Accumulator that keeps every outcome, in arrival order.
///
/// The natural aggregate for fail-soft runs where the caller wants to
/// inspect partial results and recorded failures side by side.
pub struct Collect<T, E> {
    outcomes: Vec<Outcome<T, E>>,
}

impl<T, E> Collect<T, E> {
    /// Creates an empty collector.
    pub const fn new() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<T, E> Default for Collect<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Aggregate<T, E> for Collect<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = Vec<Outcome<T, E>>;

    fn combine(&mut self, outcome: Outcome<T, E>) -> Result<(), CombineError> {
        self.outcomes.push(outcome);
        Ok(())
    }

    fn finish(self) -> Self::Output {
        self.outcomes
    }
}

// Folds behind the panic boundary the engine guarantees: a panicking
// `combine` surfaces as a combine error instead of unwinding the driver.
pub(crate) fn fold_guarded<A, T, E>(
    aggregate: &mut A,
    outcome: Outcome<T, E>,
) -> Result<(), CombineError>
where
    A: Aggregate<T, E>,
{
    match catch_unwind(AssertUnwindSafe(|| aggregate.combine(outcome))) {
        Ok(result) => result,
        Err(payload) => Err(format!("combine panicked: {}", panic_message(payload)).into()),
    }
}

pub(crate) fn finish_guarded<A, T, E>(
    aggregate: A,
) -> Result<<A as Aggregate<T, E>>::Output, CombineError>
where
    A: Aggregate<T, E>,
{
    catch_unwind(AssertUnwindSafe(|| aggregate.finish()))
        .map_err(|payload| format!("finalize panicked: {}", panic_message(payload)).into())
}
