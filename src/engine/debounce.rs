//! Debounce coalescer: collapse bursts from one author in one channel.
//!
//! Each (channel, user) bucket holds the pending messages and the handle of
//! the single live timer. A new submission appends, aborts the live timer
//! and arms a fresh one tagged with a new generation. When a timer wakes it
//! re-checks its generation under the bucket lock, so only the most recent
//! timer can take the burst, and it takes it atomically. A timer that has
//! taken its burst stays tracked until the merged message is queued, so
//! [`Coalescer::cancel_all`] can drop it even while it waits on a full queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{ChannelMessage, Job, Lane, OriginatorId, RoutingKey};
use crate::registry::ChannelRegistry;
use crate::telemetry::metrics;

type BucketKey = (RoutingKey, OriginatorId);

struct Bucket {
    pending: Vec<Job<ChannelMessage>>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Buckets {
    map: HashMap<BucketKey, Bucket>,
    /// Monotonic across all buckets so a stale timer can never match a
    /// bucket recreated under the same key.
    generation: u64,
    /// Timers that took their burst and are forwarding it, by generation.
    forwarding: HashMap<u64, JoinHandle<()>>,
    /// Set by `cancel_all`; no burst is accepted afterwards.
    closed: bool,
}

#[derive(Clone)]
pub struct Coalescer {
    registry: Arc<ChannelRegistry>,
    buckets: Arc<Mutex<Buckets>>,
}

impl Coalescer {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            buckets: Arc::new(Mutex::new(Buckets::default())),
        }
    }

    /// Buffer `message` and (re)arm its bucket's timer for `delay`.
    ///
    /// A zero delay bypasses coalescing and routes the message immediately.
    pub async fn submit(&self, message: ChannelMessage, delay: Duration) -> Result<()> {
        if self.lock().closed {
            return Err(Error::QueueClosed { lane: Lane::Channel });
        }
        if delay.is_zero() {
            debug!(
                channel = %message.channel,
                user = %message.user,
                "immediate dispatch (delay=0)"
            );
            return self.registry.enqueue(message).await;
        }

        // Admission happens now, not when the timer fires.
        self.registry.get_or_create(&message.channel)?;

        let key = (message.channel.clone(), message.user.clone());
        let mut buckets = self.lock();
        // Re-checked under the lock: `cancel_all` may have run since.
        if buckets.closed {
            return Err(Error::QueueClosed { lane: Lane::Channel });
        }
        buckets.generation += 1;
        let generation = buckets.generation;

        let bucket = buckets.map.entry(key.clone()).or_insert_with(|| Bucket {
            pending: Vec::new(),
            generation,
            timer: None,
        });
        if bucket.pending.is_empty() {
            info!(
                channel = %key.0,
                user = %key.1,
                delay_ms = delay.as_millis() as u64,
                "first message in burst, starting timer"
            );
        } else {
            info!(
                channel = %key.0,
                user = %key.1,
                pending = bucket.pending.len() + 1,
                "additional message, resetting timer"
            );
        }

        bucket.pending.push(Job::new(message));
        bucket.generation = generation;
        if let Some(timer) = bucket.timer.take() {
            timer.abort();
            debug!(channel = %key.0, user = %key.1, "cancelled previous timer");
        }
        bucket.timer = Some(tokio::spawn(self.clone().fire(key, generation, delay)));
        Ok(())
    }

    /// Messages buffered for a (channel, user) pair.
    pub fn pending(&self, channel: &RoutingKey, user: &OriginatorId) -> usize {
        self.lock()
            .map
            .get(&(channel.clone(), user.clone()))
            .map_or(0, |bucket| bucket.pending.len())
    }

    /// Buckets with a live timer.
    pub fn active_buckets(&self) -> usize {
        self.lock().map.len()
    }

    /// Merged bursts still waiting for room in their channel queue.
    pub fn forwarding(&self) -> usize {
        self.lock().forwarding.len()
    }

    /// Close the coalescer: abort every timer, including those blocked on a
    /// full queue, and drop their bursts. Later submissions fail with
    /// `QueueClosed`. Returns the number of messages dropped, counting a
    /// merged burst as one.
    pub fn cancel_all(&self) -> usize {
        let mut buckets = self.lock();
        buckets.closed = true;
        let mut dropped = 0;
        for (_, bucket) in buckets.map.drain() {
            if let Some(timer) = bucket.timer {
                timer.abort();
            }
            dropped += bucket.pending.len();
        }
        for (_, forward) in buckets.forwarding.drain() {
            forward.abort();
            dropped += 1;
        }
        dropped
    }

    async fn fire(self, key: BucketKey, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let pending = {
            let mut buckets = self.lock();
            let live = buckets
                .map
                .get(&key)
                .is_some_and(|bucket| bucket.generation == generation);
            if !live {
                debug!(channel = %key.0, user = %key.1, generation, "timer superseded");
                return;
            }
            match buckets.map.remove(&key) {
                Some(bucket) => {
                    if let Some(timer) = bucket.timer {
                        buckets.forwarding.insert(generation, timer);
                    }
                    bucket.pending
                }
                None => Vec::new(),
            }
        };

        let count = pending.len();
        info!(channel = %key.0, user = %key.1, count, "timer expired, merging messages");

        let result = match merge(pending) {
            Some(job) => {
                debug!(channel = %key.0, text = %preview(&job.payload.text), "merged text");
                match self.registry.enqueue_job(job).await {
                    Ok(()) => "forwarded",
                    Err(e) => {
                        error!(channel = %key.0, user = %key.1, error = %e, "failed to forward merged message");
                        "error"
                    }
                }
            }
            None => {
                warn!(channel = %key.0, user = %key.1, count, "no text content in debounced messages");
                "empty"
            }
        };
        self.lock().forwarding.remove(&generation);
        metrics::debounce_merges().add(1, &[KeyValue::new("result", result)]);
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Merge a burst into the first job's envelope: trimmed, non-empty texts in
/// arrival order joined by newlines. `None` if no text remains.
fn merge(pending: Vec<Job<ChannelMessage>>) -> Option<Job<ChannelMessage>> {
    let texts: Vec<String> = pending
        .iter()
        .map(|job| job.payload.text.trim())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    if texts.is_empty() {
        return None;
    }

    let mut base = pending.into_iter().next()?;
    base.payload.text = texts.join("\n");
    Some(base)
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(text: &str) -> Job<ChannelMessage> {
        Job::new(ChannelMessage::new("C1", "U1", text))
    }

    #[test]
    fn merge_joins_in_arrival_order() {
        let merged = merge(vec![job("a"), job("b"), job("c")]).unwrap();
        assert_eq!(merged.payload.text, "a\nb\nc");
    }

    #[test]
    fn merge_uses_first_envelope() {
        let first = job("a").payload.thread("1700.01");
        let first = Job::new(first);
        let first_id = first.id;
        let second = Job::new(ChannelMessage::new("C1", "U1", "b").thread("1700.02"));

        let merged = merge(vec![first, second]).unwrap();
        assert_eq!(merged.id, first_id);
        assert_eq!(merged.payload.thread_ts.as_deref(), Some("1700.01"));
    }

    #[test]
    fn merge_trims_and_skips_blank_texts() {
        let merged = merge(vec![job("  a "), job("   "), job("b\n")]).unwrap();
        assert_eq!(merged.payload.text, "a\nb");
    }

    #[test]
    fn merge_of_blank_burst_is_none() {
        assert!(merge(vec![job(""), job("  \n")]).is_none());
        assert!(merge(Vec::new()).is_none());
    }

    fn coalescer(queue_capacity: usize) -> Coalescer {
        Coalescer::new(Arc::new(ChannelRegistry::new(queue_capacity, 10)))
    }

    #[tokio::test(start_paused = true)]
    async fn closed_coalescer_rejects_submissions() {
        let coalescer = coalescer(10);
        assert_eq!(coalescer.cancel_all(), 0);

        for delay in [Duration::from_secs(1), Duration::ZERO] {
            let err = coalescer
                .submit(ChannelMessage::new("C1", "U1", "late"), delay)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::QueueClosed { lane: Lane::Channel }));
        }
        assert_eq!(coalescer.active_buckets(), 0);
        assert!(coalescer.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_burst_waiting_on_full_queue() {
        let coalescer = coalescer(1);
        let channel = RoutingKey::from("C1");
        coalescer
            .registry
            .enqueue(ChannelMessage::new("C1", "U1", "old"))
            .await
            .unwrap();

        coalescer
            .submit(ChannelMessage::new("C1", "U1", "new"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coalescer.active_buckets(), 0);
        assert_eq!(coalescer.forwarding(), 1);

        assert_eq!(coalescer.cancel_all(), 1);
        assert_eq!(coalescer.forwarding(), 0);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let queue = coalescer.registry.get(&channel).unwrap();
        assert_eq!(queue.pop().await.unwrap().payload.text, "old");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        assert_eq!(preview(&long).chars().count(), 100);
        assert_eq!(preview("short"), "short");
    }
}
