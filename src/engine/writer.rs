//! Sequential writer lane for order-sensitive persistence.
//!
//! Exactly one worker drains the queue, so handler invocations follow
//! enqueue order and never overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::KeyValue;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::model::{Job, Lane};
use crate::queue::JobQueue;
use crate::telemetry::job::start_job_span;
use crate::telemetry::metrics;

use super::shutdown::ShutdownToken;
use super::worker::process_job;

#[derive(Clone)]
pub struct SequentialWriter {
    queue: JobQueue<Value>,
    started: Arc<AtomicBool>,
}

impl SequentialWriter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: JobQueue::bounded(Lane::Memory, queue_capacity),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn enqueue(&self, payload: Value) -> Result<()> {
        self.queue.push(Job::new(payload)).await?;
        info!(depth = self.queue.len(), "memory job enqueued");
        metrics::jobs_enqueued().add(1, &[KeyValue::new("lane", Lane::Memory.as_str())]);
        Ok(())
    }

    /// Spawn the single writer. May only succeed once.
    pub(crate) fn start(
        &self,
        handler: Arc<dyn Handler<Value>>,
        mut shutdown: ShutdownToken,
    ) -> Result<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted(Lane::Memory));
        }

        let queue = self.queue.clone();
        Ok(tokio::spawn(async move {
            info!("memory writer started");
            loop {
                debug!("waiting for next memory job");
                let job = tokio::select! {
                    _ = shutdown.wait() => break,
                    job = queue.pop() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                debug!(job_id = %job.id, depth = queue.len(), "memory job received");

                let span = start_job_span(Lane::Memory, &job.id, 0);
                process_job(Lane::Memory, 0, job, &handler, span).await;
            }
            info!("memory writer stopped");
        }))
    }

    /// Jobs waiting to be written.
    pub fn depth(&self) -> usize {
        self.queue.len()
    }
}
