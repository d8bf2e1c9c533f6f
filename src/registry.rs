//! Channel queue registry: routing key → bounded FIFO queue.
//!
//! Queues are created lazily on first use and live for the lifetime of the
//! registry. Every creation is announced exactly once on an internal event
//! channel so the channel supervisor can spawn workers without polling.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{ChannelMessage, Job, Lane, RoutingKey};
use crate::queue::JobQueue;
use crate::telemetry::metrics;

/// Announcement of a queue created for a previously unseen routing key.
#[derive(Debug)]
pub struct NewChannel {
    pub key: RoutingKey,
    pub queue: JobQueue<ChannelMessage>,
}

pub struct ChannelRegistry {
    queues: Mutex<HashMap<RoutingKey, JobQueue<ChannelMessage>>>,
    queue_capacity: usize,
    max_channels: usize,
    created_tx: mpsc::UnboundedSender<NewChannel>,
    created_rx: Mutex<Option<mpsc::UnboundedReceiver<NewChannel>>>,
}

impl ChannelRegistry {
    pub fn new(queue_capacity: usize, max_channels: usize) -> Self {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        Self {
            queues: Mutex::new(HashMap::new()),
            queue_capacity,
            max_channels,
            created_tx,
            created_rx: Mutex::new(Some(created_rx)),
        }
    }

    /// Return the queue for `key`, creating it on first access.
    ///
    /// Idempotent: concurrent first accesses observe the same queue.
    pub fn get_or_create(&self, key: &RoutingKey) -> Result<JobQueue<ChannelMessage>> {
        let mut queues = self.queues();
        if let Some(queue) = queues.get(key) {
            return Ok(queue.clone());
        }

        if queues.len() >= self.max_channels {
            warn!(channel = %key, limit = self.max_channels, "channel limit reached, rejecting");
            return Err(Error::ChannelLimit {
                limit: self.max_channels,
            });
        }

        let queue = JobQueue::bounded(Lane::Channel, self.queue_capacity);
        queues.insert(key.clone(), queue.clone());

        // Announced under the lock so events arrive in creation order. The
        // receiver is only gone once the supervisor has stopped.
        let _ = self.created_tx.send(NewChannel {
            key: key.clone(),
            queue: queue.clone(),
        });

        info!(channel = %key, capacity = self.queue_capacity, "created channel queue");
        metrics::channels_created().add(1, &[]);
        Ok(queue)
    }

    /// Route a message to its channel queue, waiting while the queue is full.
    pub async fn enqueue(&self, message: ChannelMessage) -> Result<()> {
        self.enqueue_job(Job::new(message)).await
    }

    /// Route an already-enveloped message (e.g. a merged debounce burst).
    pub async fn enqueue_job(&self, job: Job<ChannelMessage>) -> Result<()> {
        let channel = job.payload.channel.clone();
        let queue = self.get_or_create(&channel)?;
        queue.push(job).await?;

        info!(%channel, depth = queue.len(), "message enqueued");
        metrics::jobs_enqueued().add(1, &[KeyValue::new("lane", Lane::Channel.as_str())]);
        Ok(())
    }

    pub fn get(&self, key: &RoutingKey) -> Option<JobQueue<ChannelMessage>> {
        self.queues().get(key).cloned()
    }

    /// Routing keys with a queue, sorted.
    pub fn keys(&self) -> Vec<RoutingKey> {
        let mut keys: Vec<_> = self.queues().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.queues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the creation event stream to the supervisor. Yields `None` once
    /// it has been taken.
    pub(crate) fn take_creations(&self) -> Option<mpsc::UnboundedReceiver<NewChannel>> {
        self.created_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<RoutingKey, JobQueue<ChannelMessage>>> {
        // The map holds no invariant a panicking holder could break.
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
