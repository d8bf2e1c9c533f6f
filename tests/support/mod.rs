//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_rs::config::DispatchConfig;
use switchboard_rs::model::Status;
use switchboard_rs::status::{SinkError, StatusSink};
use tokio::sync::mpsc;

/// Sink that remembers every status it was given.
#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<Status>>,
    failure: Option<fn() -> SinkError>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink that records, then fails every call with `failure()`.
    pub fn failing(failure: fn() -> SinkError) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(Vec::new()),
            failure: Some(failure),
        })
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().unwrap().clone()
    }

    /// Poll until at least `n` statuses were recorded.
    pub async fn wait_for(&self, n: usize) -> Vec<Status> {
        for _ in 0..500 {
            let statuses = self.statuses();
            if statuses.len() >= n {
                return statuses;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} statuses, got {:?}", self.statuses());
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn set_status(&self, status: Status) -> Result<(), SinkError> {
        self.statuses.lock().unwrap().push(status);
        match self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

pub fn config() -> DispatchConfig {
    DispatchConfig {
        queue_capacity: 100,
        workers_per_channel: 1,
        orchestrator_workers: 2,
        debounce_ms: 0,
        max_channels: 100,
    }
}

/// Receive `n` items or panic after a generous timeout.
pub async fn recv_n<T>(rx: &mut mpsc::UnboundedReceiver<T>, n: usize) -> Vec<T> {
    let mut items = Vec::with_capacity(n);
    while items.len() < n {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => panic!("channel closed after {} of {n} items", items.len()),
            Err(_) => panic!("timed out after {} of {n} items", items.len()),
        }
    }
    items
}
