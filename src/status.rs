//! Presence sink for the orchestrator pool's busy/idle status.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::Status;
use crate::telemetry::metrics;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The collaborator cannot set presence in its current configuration
    /// (e.g. a bot token without profile scope). Expected, not a fault.
    #[error("presence update not supported: {0}")]
    Unsupported(String),

    #[error("presence update failed: {0}")]
    Failed(String),
}

/// External capability that renders the pool status (e.g. a chat profile).
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, status: Status) -> Result<(), SinkError>;
}

/// Sink that only logs the presence it would set.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn set_status(&self, status: Status) -> Result<(), SinkError> {
        let presence = status.presence();
        info!(
            status_text = %presence.status_text,
            status_emoji = %presence.status_emoji,
            status_expiration = presence.status_expiration,
            "presence updated"
        );
        Ok(())
    }
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusSink;

#[async_trait]
impl StatusSink for NoopStatusSink {
    async fn set_status(&self, _status: Status) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Push a status to the sink. Failures are logged and swallowed.
pub(crate) async fn broadcast(sink: &dyn StatusSink, status: Status) {
    let result = match sink.set_status(status).await {
        Ok(()) => {
            debug!(%status, "status broadcast");
            "ok"
        }
        Err(SinkError::Unsupported(reason)) => {
            debug!(%status, %reason, "status update not supported by sink");
            "unsupported"
        }
        Err(e) => {
            warn!(%status, error = %e, "failed to update status");
            "error"
        }
    };
    metrics::status_broadcasts().add(
        1,
        &[
            KeyValue::new("status", status.as_str()),
            KeyValue::new("result", result),
        ],
    );
}
