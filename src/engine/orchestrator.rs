//! Orchestrator pool: one global queue, a fixed set of workers, and a
//! busy/idle status pushed to the presence sink on every start and finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::KeyValue;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::model::{Job, Lane, Status};
use crate::queue::JobQueue;
use crate::status::{StatusSink, broadcast};
use crate::telemetry::job::start_job_span;
use crate::telemetry::metrics;

use super::shutdown::ShutdownToken;
use super::worker::process_job;

/// Busy-worker accounting. Only touched under the pool's mutex.
#[derive(Debug, Default)]
struct PoolState {
    capacity: usize,
    active: usize,
}

#[derive(Clone)]
pub struct OrchestratorPool {
    queue: JobQueue<Value>,
    state: Arc<Mutex<PoolState>>,
    sink: Arc<dyn StatusSink>,
    started: Arc<AtomicBool>,
}

impl OrchestratorPool {
    pub fn new(queue_capacity: usize, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            queue: JobQueue::bounded(Lane::Orchestrator, queue_capacity),
            state: Arc::new(Mutex::new(PoolState::default())),
            sink,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push a job onto the global queue, waiting while it is full.
    pub async fn enqueue(&self, payload: Value) -> Result<()> {
        self.queue.push(Job::new(payload)).await?;
        info!(depth = self.queue.len(), "orchestrator job enqueued");
        metrics::jobs_enqueued().add(1, &[KeyValue::new("lane", Lane::Orchestrator.as_str())]);
        Ok(())
    }

    /// Spawn `num_workers` workers. May only succeed once per pool.
    pub(crate) fn start(
        &self,
        handler: Arc<dyn Handler<Value>>,
        num_workers: usize,
        shutdown: ShutdownToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        if num_workers == 0 {
            return Err(Error::Config(
                "orchestrator pool needs at least one worker".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted(Lane::Orchestrator));
        }

        // No worker exists yet, so the lock is free.
        self.state
            .try_lock()
            .map_err(|_| Error::Other("orchestrator state locked before start".to_string()))?
            .capacity = num_workers;

        let handles = (0..num_workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: self.queue.clone(),
                    state: Arc::clone(&self.state),
                    sink: Arc::clone(&self.sink),
                    handler: Arc::clone(&handler),
                };
                info!(worker_id, num_workers, "created orchestrator worker");
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();
        Ok(handles)
    }

    /// Workers currently running a job.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active
    }

    pub async fn status(&self) -> Status {
        let state = self.state.lock().await;
        Status::from_counts(state.active, state.capacity)
    }

    /// Jobs waiting in the global queue.
    pub fn depth(&self) -> usize {
        self.queue.len()
    }
}

struct Worker {
    id: usize,
    queue: JobQueue<Value>,
    state: Arc<Mutex<PoolState>>,
    sink: Arc<dyn StatusSink>,
    handler: Arc<dyn Handler<Value>>,
}

impl Worker {
    async fn run(self, mut shutdown: ShutdownToken) {
        info!(worker_id = self.id, "orchestrator worker started");

        loop {
            debug!(worker_id = self.id, "waiting for next job");
            let job = tokio::select! {
                _ = shutdown.wait() => break,
                job = self.queue.pop() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            debug!(worker_id = self.id, job_id = %job.id, depth = self.queue.len(), "job received");

            let span = start_job_span(Lane::Orchestrator, &job.id, self.id);
            self.transition(true).await;
            process_job(Lane::Orchestrator, self.id, job, &self.handler, span).await;
            self.transition(false).await;
        }

        info!(worker_id = self.id, "orchestrator worker stopped");
    }

    /// Count a job in or out and broadcast the resulting status. The guard
    /// is held across the sink call so the sink sees transitions in order.
    async fn transition(&self, starting: bool) {
        let mut state = self.state.lock().await;
        if starting {
            state.active += 1;
        } else {
            state.active -= 1;
        }
        debug_assert!(state.active <= state.capacity);
        metrics::orchestrator_active().add(if starting { 1 } else { -1 }, &[]);

        let status = Status::from_counts(state.active, state.capacity);
        info!(
            worker_id = self.id,
            active = state.active,
            capacity = state.capacity,
            %status,
            "updating status"
        );
        broadcast(self.sink.as_ref(), status).await;
    }
}
