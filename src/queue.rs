//! Bounded FIFO job queue drained by one or more workers.
//!
//! Producers suspend in [`JobQueue::push`] while the queue is full. Workers
//! take turns on the receiving end through a fair async mutex, so dequeue
//! order always equals enqueue order no matter how many workers share it.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::model::{Job, Lane};

pub struct JobQueue<T> {
    lane: Lane,
    tx: mpsc::Sender<Job<T>>,
    rx: Arc<Mutex<mpsc::Receiver<Job<T>>>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> std::fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("lane", &self.lane)
            .field("len", &(self.tx.max_capacity() - self.tx.capacity()))
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

impl<T: Send> JobQueue<T> {
    /// Create a queue holding at most `capacity` jobs (minimum 1).
    pub fn bounded(lane: Lane, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            lane,
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Push a job, waiting for a free slot if the queue is full.
    pub async fn push(&self, job: Job<T>) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| Error::QueueClosed { lane: self.lane })
    }

    /// Take the oldest job, waiting until one is available.
    ///
    /// Cancel-safe: dropping the future never loses a job.
    pub async fn pop(&self) -> Option<Job<T>> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Jobs currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Whether both handles refer to the same underlying queue.
    pub fn same_queue(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}
