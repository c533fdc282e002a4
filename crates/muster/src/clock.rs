use core::time::Duration;

/// A trait for time sources that measure the wall-clock span of a run.
///
/// This abstraction allows you to plug in the real monotonic clock, a
/// runtime-virtualized clock (see
/// [`TokioClock`](crate::TokioClock) under the `async-tokio` feature), or a
/// mocked time source in tests.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use muster::Clock;
///
/// struct FixedClock;
/// impl Clock for FixedClock {
///     type Instant = ();
///     fn now(&self) {}
///     fn elapsed(&self, _since: ()) -> Duration {
///         Duration::from_millis(1234)
///     }
/// }
///
/// let clock = FixedClock;
/// assert_eq!(clock.elapsed(clock.now()), Duration::from_millis(1234));
/// ```
pub trait Clock: Send + Sync + 'static {
    /// An opaque point in time captured by [`now`](Clock::now).
    type Instant: Copy + Send + 'static;

    /// Captures the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the time elapsed since a previously captured instant.
    fn elapsed(&self, since: Self::Instant) -> Duration;
}

/// The default [`Clock`], backed by [`std::time::Instant`].
///
/// Monotonic and immune to wall-clock adjustments, so a run's elapsed time
/// never goes backwards under NTP or daylight-savings changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn elapsed(&self, since: Self::Instant) -> Duration {
        since.elapsed()
    }
}
