/// Represents the settled result of one work unit.
///
/// Every admitted input item produces exactly one `Outcome`:
///
/// - [`Outcome::Success`] carries the value the work unit returned.
/// - [`Outcome::Failure`] carries the error it returned instead.
///
/// Under [`FailurePolicy::FailSoft`](crate::FailurePolicy::FailSoft),
/// failures are folded into the aggregate alongside successes, so aggregates
/// see both variants. Under
/// [`FailurePolicy::FailFast`](crate::FailurePolicy::FailFast), the first
/// failure terminates the run instead of being folded.
///
/// # Example
///
/// ```
/// use muster::Outcome;
///
/// let ok: Outcome<u64, &str> = Outcome::Success(7);
/// let err: Outcome<u64, &str> = Outcome::Failure("backend down");
///
/// assert!(ok.is_success());
/// assert_eq!(ok.success(), Some(7));
/// assert_eq!(err.failure(), Some("backend down"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The work unit produced a value.
    Success(T),
    /// The work unit reported an error.
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Returns `true` if this outcome is a [`Outcome::Success`].
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if this outcome is a [`Outcome::Failure`].
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the success value, if any, consuming the outcome.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the failure cause, if any, consuming the outcome.
    pub fn failure(self) -> Option<E> {
        match self {
            Self::Success(_) => None,
            Self::Failure(cause) => Some(cause),
        }
    }

    /// Converts the outcome back into the `Result` the work unit returned.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(cause) => Err(cause),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(cause) => Self::Failure(cause),
        }
    }
}
