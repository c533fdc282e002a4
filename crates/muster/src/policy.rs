/// What a run does when a work unit reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first [`Outcome::Failure`](crate::Outcome::Failure) terminates the
    /// run, carrying that cause. Outstanding work units are cancelled on a
    /// best-effort basis and any settlements that still arrive are discarded,
    /// never folded.
    #[default]
    FailFast,
    /// Failures are folded into the aggregate like successes. The run
    /// completes only once every admitted item is accounted for, so partial
    /// results remain available to the caller.
    FailSoft,
}

/// How settled outcomes reach the aggregate.
///
/// Both disciplines guarantee each outcome is folded exactly once and that
/// folds never run concurrently; they differ in where the fold executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoldStrategy {
    /// Outcomes cross the completion channel and are folded by the
    /// coordinator task itself. All folding is confined to one consumer, so
    /// no locking is involved.
    #[default]
    Confined,
    /// The completing work unit folds its own outcome under a mutex and the
    /// completion channel carries only an admission credit. Folding happens
    /// on whichever worker finished, which keeps large outcome values off
    /// the channel.
    Locked,
}
