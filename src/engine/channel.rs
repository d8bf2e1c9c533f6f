//! Channel worker pool: a fixed set of workers per routing key.
//!
//! The supervisor consumes the registry's creation events, including those
//! emitted before it started, and spawns `workers_per_channel` workers the
//! first time it sees a key. Worker sets never shrink.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::model::{ChannelMessage, Lane, RoutingKey};
use crate::queue::JobQueue;
use crate::registry::ChannelRegistry;
use crate::telemetry::job::{record_routing_key, start_job_span};

use super::shutdown::ShutdownToken;
use super::worker::process_job;

/// Start the supervisor. Fails if one was already started for `registry`.
pub(crate) fn spawn_supervisor(
    registry: &ChannelRegistry,
    handler: Arc<dyn Handler<ChannelMessage>>,
    workers_per_channel: usize,
    shutdown: ShutdownToken,
) -> Result<JoinHandle<()>> {
    let mut created = registry
        .take_creations()
        .ok_or(Error::AlreadyStarted(Lane::Channel))?;

    Ok(tokio::spawn(async move {
        let mut supervised: HashSet<RoutingKey> = HashSet::new();
        let mut workers = JoinSet::new();
        let mut stop = shutdown.clone();
        info!(workers_per_channel, "channel supervisor started");

        loop {
            let channel = tokio::select! {
                _ = stop.wait() => break,
                next = created.recv() => match next {
                    Some(channel) => channel,
                    None => break,
                },
            };

            if !supervised.insert(channel.key.clone()) {
                continue;
            }
            for worker_id in 0..workers_per_channel {
                workers.spawn(channel_worker(
                    channel.key.clone(),
                    channel.queue.clone(),
                    worker_id,
                    Arc::clone(&handler),
                    shutdown.clone(),
                ));
            }
            info!(
                channel = %channel.key,
                workers = workers_per_channel,
                "spawned workers for new channel"
            );

            while let Some(result) = workers.try_join_next() {
                if let Err(e) = result {
                    error!("channel worker crashed: {e}");
                }
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("channel worker crashed: {e}");
            }
        }
        info!(channels = supervised.len(), "channel supervisor stopped");
    }))
}

async fn channel_worker(
    channel: RoutingKey,
    queue: JobQueue<ChannelMessage>,
    worker_id: usize,
    handler: Arc<dyn Handler<ChannelMessage>>,
    mut shutdown: ShutdownToken,
) {
    debug!(%channel, worker_id, "channel worker started");

    loop {
        let job = tokio::select! {
            _ = shutdown.wait() => break,
            job = queue.pop() => match job {
                Some(job) => job,
                None => break,
            },
        };

        info!(%channel, worker_id, job_id = %job.id, depth = queue.len(), "processing message");
        let span = start_job_span(Lane::Channel, &job.id, worker_id);
        record_routing_key(&span, &channel.0);
        process_job(Lane::Channel, worker_id, job, &handler, span).await;
    }

    debug!(%channel, worker_id, "channel worker stopped");
}
