//! Job execution span helpers.

use tracing::Span;

use crate::model::{JobId, Lane};

/// Start a span for one handler invocation.
///
/// `job.routing_key` and `job.result` are declared empty and filled via
/// [`record_routing_key`] and [`record_job_result`].
pub fn start_job_span(lane: Lane, job_id: &JobId, worker_id: usize) -> Span {
    tracing::info_span!(
        "job.process",
        "job.lane" = lane.as_str(),
        "job.id" = %job_id,
        "job.worker" = worker_id,
        "job.routing_key" = tracing::field::Empty,
        "job.result" = tracing::field::Empty,
    )
}

pub fn record_routing_key(span: &Span, key: &str) {
    span.record("job.routing_key", key);
}

pub fn record_job_result(span: &Span, result: &str) {
    span.record("job.result", result);
}
