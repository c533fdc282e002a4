use core::future::Future;

/// A trait that abstracts over how to spawn detached tasks in async
/// contexts.
///
/// This allows the engine to be generic over runtimes like `Tokio` or
/// `Smol`. Every run receives its execution context as a parameter rather
/// than an ambient global scheduler, so tests can substitute a
/// deterministic or intentionally broken spawner.
pub trait Spawn: Send + Sync + 'static {
    /// Spawns a future to run to completion in the background.
    ///
    /// The future must be `Send` so the runtime may move it across worker
    /// threads.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
