// src/health/probe.rs
use super::Health;
use async_trait::async_trait;

/// Anything that can report whether it is healthy.
///
/// Implementations report their own failures through the returned record
/// (usually `DOWN` plus an `error` annotation) instead of erroring, and
/// enforce their own timeouts: the aggregator waits for every probe.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self) -> Health;
}

/// Adapts a plain closure into a [`Checker`].
pub struct CheckerFn<F>(pub F);

#[async_trait]
impl<F> Checker for CheckerFn<F>
where
    F: Fn() -> Health + Send + Sync,
{
    async fn check(&self) -> Health {
        (self.0)()
    }
}
