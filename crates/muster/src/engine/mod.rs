mod dispatcher;
mod invoker;
mod orchestrator;
#[cfg(all(test, feature = "async-tokio"))]
mod tests;

pub use orchestrator::*;
