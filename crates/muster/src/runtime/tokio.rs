use crate::{Clock, Spawn};
use core::future::Future;
use core::time::Duration;

/// An implementation of [`Spawn`] using the
/// [`tokio`](https://docs.rs/tokio) runtime.
///
/// This is the default execution context for async applications built on
/// Tokio. Spawning requires a reactor, so runs must be started from within
/// a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawn;

impl Spawn for TokioSpawn {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(fut);
    }
}

/// An implementation of [`Clock`] using Tokio's virtualizable timer.
///
/// Behaves like [`MonotonicClock`](crate::MonotonicClock) on a normal
/// runtime, but follows the test clock under
/// `#[tokio::test(start_paused = true)]`, which makes elapsed-time
/// assertions exact instead of approximate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn elapsed(&self, since: Self::Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_tracks_the_paused_timer() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.elapsed(start), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn tokio_spawn_runs_detached_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        TokioSpawn.spawn(async move {
            let _ = tx.send(42u8);
        });
        assert_eq!(rx.await, Ok(42));
    }
}
