//! Processing functions invoked by the dispatcher's workers.
//!
//! A handler is the external collaborator at the end of a lane: chat
//! processing, LLM orchestration, memory persistence. The dispatcher never
//! interprets the payload, and handler errors never reach the producer.

use std::future::Future;

use async_trait::async_trait;

#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync {
    /// Process one payload. Errors are logged by the worker and the job is
    /// discarded.
    async fn handle(&self, payload: T) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F, Fut> Handler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, payload: T) -> anyhow::Result<()> {
        (self)(payload).await
    }
}
