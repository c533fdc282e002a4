use crate::Spawn;
use core::future::Future;

/// An implementation of [`Spawn`] using the
/// [`smol`](https://docs.rs/smol) runtime's global executor.
///
/// Tasks are detached on spawn; the run handle is the only completion
/// signal the caller needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolSpawn;

impl Spawn for SmolSpawn {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        smol::spawn(fut).detach();
    }
}
