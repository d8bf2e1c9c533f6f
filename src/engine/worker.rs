//! Handler invocation shared by every lane's worker loop.
//!
//! Each invocation runs in its own task so a panicking handler is contained
//! the same way as one returning an error: logged, counted, discarded.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, Span, error, info};

use crate::handler::Handler;
use crate::model::{Job, Lane};
use crate::telemetry::job::record_job_result;
use crate::telemetry::metrics;

/// How a single handler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed(String),
    Panicked(String),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "ok",
            Outcome::Failed(_) => "error",
            Outcome::Panicked(_) => "panic",
        }
    }
}

/// Run `handler` on `job` to completion inside `span`. Never retries.
pub(crate) async fn process_job<T: Send + 'static>(
    lane: Lane,
    worker_id: usize,
    job: Job<T>,
    handler: &Arc<dyn Handler<T>>,
    span: Span,
) -> Outcome {
    let lane_attr = [KeyValue::new("lane", lane.as_str())];
    metrics::queue_wait_ms().record(job.wait_ms(), &lane_attr);

    let job_id = job.id;
    let handler = Arc::clone(handler);
    let payload = job.payload;
    let start = Instant::now();

    let task = tokio::spawn(async move { handler.handle(payload).await }.instrument(span.clone()));
    let outcome = match task.await {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(e)) => Outcome::Failed(format!("{e:#}")),
        Err(e) if e.is_panic() => Outcome::Panicked(panic_message(e.into_panic())),
        Err(e) => Outcome::Failed(e.to_string()),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    span.in_scope(|| match &outcome {
        Outcome::Completed => {
            info!(%lane, worker_id, job_id = %job_id, duration_ms, "job completed");
        }
        Outcome::Failed(e) => {
            error!(%lane, worker_id, job_id = %job_id, duration_ms, error = %e, "job failed");
        }
        Outcome::Panicked(msg) => {
            error!(%lane, worker_id, job_id = %job_id, duration_ms, panic = %msg, "handler panicked");
        }
    });
    record_job_result(&span, outcome.label());

    metrics::job_duration_ms().record(duration_ms as f64, &lane_attr);
    metrics::jobs_processed().add(
        1,
        &[
            KeyValue::new("lane", lane.as_str()),
            KeyValue::new("result", outcome.label()),
        ],
    );
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::job::start_job_span;

    fn span(job: &Job<u32>) -> Span {
        start_job_span(Lane::Memory, &job.id, 0)
    }

    #[tokio::test]
    async fn completed_handler() {
        let handler: Arc<dyn Handler<u32>> = Arc::new(|_n: u32| async { anyhow::Ok(()) });
        let job = Job::new(7);
        let span = span(&job);
        let outcome = process_job(Lane::Memory, 0, job, &handler, span).await;
        assert_eq!(outcome, Outcome::Completed);
    }

    #[tokio::test]
    async fn handler_error_is_captured() {
        let handler: Arc<dyn Handler<u32>> =
            Arc::new(|n: u32| async move { Err::<(), _>(anyhow::anyhow!("bad payload {n}")) });
        let job = Job::new(7);
        let span = span(&job);
        let outcome = process_job(Lane::Memory, 0, job, &handler, span).await;
        assert_eq!(outcome, Outcome::Failed("bad payload 7".to_string()));
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let handler: Arc<dyn Handler<u32>> = Arc::new(|n: u32| async move {
            if n > 0 {
                panic!("boom");
            }
            anyhow::Ok(())
        });
        let job = Job::new(1);
        let span = span(&job);
        let outcome = process_job(Lane::Memory, 0, job, &handler, span).await;
        assert_eq!(outcome, Outcome::Panicked("boom".to_string()));
    }
}
