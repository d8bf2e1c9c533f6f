//! The dispatcher context: every queue, pool and timer of the process.
//!
//! Constructed once at startup and shared by `Arc` with every call site
//! that produces events or installs handlers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::model::{ChannelMessage, Lane};
use crate::registry::ChannelRegistry;
use crate::status::StatusSink;

use super::channel::spawn_supervisor;
use super::debounce::Coalescer;
use super::orchestrator::OrchestratorPool;
use super::shutdown::ShutdownSender;
use super::writer::SequentialWriter;

pub struct Dispatcher {
    config: DispatchConfig,
    registry: Arc<ChannelRegistry>,
    coalescer: Coalescer,
    orchestrator: OrchestratorPool,
    writer: SequentialWriter,
    shutdown: ShutdownSender,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, sink: Arc<dyn StatusSink>) -> Self {
        let registry = Arc::new(ChannelRegistry::new(
            config.queue_capacity,
            config.max_channels,
        ));
        Self {
            coalescer: Coalescer::new(Arc::clone(&registry)),
            orchestrator: OrchestratorPool::new(config.queue_capacity, sink),
            writer: SequentialWriter::new(config.queue_capacity),
            registry,
            config,
            shutdown: ShutdownSender::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    pub fn orchestrator(&self) -> &OrchestratorPool {
        &self.orchestrator
    }

    pub fn writer(&self) -> &SequentialWriter {
        &self.writer
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Route a message to its channel queue. Waits while the queue is full.
    pub async fn enqueue_message(&self, message: ChannelMessage) -> Result<()> {
        self.ensure_open(Lane::Channel)?;
        self.registry.enqueue(message).await
    }

    /// Route a message through the debounce coalescer.
    pub async fn debounced_enqueue_message(
        &self,
        message: ChannelMessage,
        delay: Duration,
    ) -> Result<()> {
        self.ensure_open(Lane::Channel)?;
        self.coalescer.submit(message, delay).await
    }

    pub async fn enqueue_orchestrator_job(&self, payload: Value) -> Result<()> {
        self.ensure_open(Lane::Orchestrator)?;
        self.orchestrator.enqueue(payload).await
    }

    pub async fn enqueue_memory_job(&self, payload: Value) -> Result<()> {
        self.ensure_open(Lane::Memory)?;
        self.writer.enqueue(payload).await
    }

    // -----------------------------------------------------------------------
    // Installation hooks (each callable once)
    // -----------------------------------------------------------------------

    pub fn start_channel_workers<H>(&self, handler: H, workers_per_channel: usize) -> Result<()>
    where
        H: Handler<ChannelMessage> + 'static,
    {
        if workers_per_channel == 0 {
            return Err(Error::Config(
                "workers_per_channel must be at least 1".to_string(),
            ));
        }
        let handle = spawn_supervisor(
            &self.registry,
            Arc::new(handler),
            workers_per_channel,
            self.shutdown.token(),
        )?;
        self.track([handle]);
        Ok(())
    }

    pub fn start_orchestrator_workers<H>(&self, handler: H, num_workers: usize) -> Result<()>
    where
        H: Handler<Value> + 'static,
    {
        let handles = self
            .orchestrator
            .start(Arc::new(handler), num_workers, self.shutdown.token())?;
        self.track(handles);
        Ok(())
    }

    pub fn start_memory_worker<H>(&self, handler: H) -> Result<()>
    where
        H: Handler<Value> + 'static,
    {
        let handle = self
            .writer
            .start(Arc::new(handler), self.shutdown.token())?;
        self.track([handle]);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_shutdown()
    }

    /// Stop accepting jobs, drop pending debounce bursts, and wait for every
    /// worker to finish its current job. Queued jobs are discarded.
    pub async fn shutdown(&self) {
        self.shutdown.shutdown();

        let dropped = self.coalescer.cancel_all();
        if dropped > 0 {
            warn!(dropped, "discarded pending debounced messages");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!("dispatcher task ended abnormally: {e}");
            }
        }
        info!("dispatcher stopped");
    }

    fn ensure_open(&self, lane: Lane) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::QueueClosed { lane });
        }
        Ok(())
    }

    fn track(&self, handles: impl IntoIterator<Item = JoinHandle<()>>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
    }
}
