//! Core data model.
//!
//! A job is an opaque payload wrapped in an envelope that records when it
//! entered the dispatcher. Channel jobs additionally carry the routing key
//! and originator used for lane selection and debounce bucketing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Conversation/channel identifier. Groups events into one ordered lane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(pub String);

/// Author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginatorId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(RoutingKey);
string_id!(OriginatorId);

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Job envelope
// ---------------------------------------------------------------------------

/// Immutable envelope around a payload. Consumed exactly once by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<T> {
    pub id: JobId,
    pub payload: T,
    pub enqueued_at: DateTime<Utc>,
}

impl<T> Job<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: JobId::new(),
            payload,
            enqueued_at: Utc::now(),
        }
    }

    /// Milliseconds elapsed since the job entered the dispatcher.
    pub fn wait_ms(&self) -> f64 {
        (Utc::now() - self.enqueued_at).num_milliseconds().max(0) as f64
    }
}

/// An inbound chat message as seen by the dispatcher.
///
/// Only `channel`, `user` and `text` are interpreted. Every other upstream
/// field is carried through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: RoutingKey,
    pub user: OriginatorId,
    #[serde(default)]
    pub text: String,
    /// Thread or session hint from the upstream source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChannelMessage {
    pub fn new(
        channel: impl Into<RoutingKey>,
        user: impl Into<OriginatorId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user: user.into(),
            text: text.into(),
            thread_ts: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Lanes and status
// ---------------------------------------------------------------------------

/// The three execution lanes of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Channel,
    Orchestrator,
    Memory,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Channel => "channel",
            Lane::Orchestrator => "orchestrator",
            Lane::Memory => "memory",
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate orchestrator pool status broadcast to the presence sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Every orchestrator worker is occupied.
    Busy,
    Idle,
}

impl Status {
    /// Busy iff every worker is occupied. A pool without workers is idle.
    pub fn from_counts(active: usize, capacity: usize) -> Self {
        if capacity > 0 && active >= capacity {
            Status::Busy
        } else {
            Status::Idle
        }
    }

    pub fn presence(self) -> Presence {
        match self {
            Status::Busy => Presence {
                status_text: "i'm busy".to_string(),
                status_emoji: ":hourglass_flowing_sand:".to_string(),
                status_expiration: 0,
            },
            Status::Idle => Presence::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Busy => "busy",
            Status::Idle => "idle",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields a presence sink sets. Empty fields clear the status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub status_text: String,
    pub status_emoji: String,
    /// Unix time at which the status clears itself; 0 never expires.
    #[serde(default)]
    pub status_expiration: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_is_busy_only_at_capacity() {
        assert_eq!(Status::from_counts(0, 2), Status::Idle);
        assert_eq!(Status::from_counts(1, 2), Status::Idle);
        assert_eq!(Status::from_counts(2, 2), Status::Busy);
        assert_eq!(Status::from_counts(0, 0), Status::Idle);
    }

    #[test]
    fn idle_presence_clears_profile() {
        let idle = Status::Idle.presence();
        assert_eq!(idle, Presence::default());
        assert_eq!(idle.status_expiration, 0);
        assert_eq!(
            serde_json::to_value(&idle).unwrap(),
            json!({"status_text": "", "status_emoji": "", "status_expiration": 0})
        );
        assert_eq!(Status::Busy.presence().status_text, "i'm busy");
    }

    #[test]
    fn channel_message_keeps_unknown_fields() {
        let msg: ChannelMessage = serde_json::from_value(json!({
            "channel": "C1",
            "user": "U1",
            "text": "hi",
            "ts": "1700000000.0001",
            "files": [],
        }))
        .unwrap();

        assert_eq!(msg.channel, RoutingKey::from("C1"));
        assert_eq!(msg.thread_ts, None);
        assert_eq!(msg.extra["ts"], json!("1700000000.0001"));

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["files"], json!([]));
    }

    #[test]
    fn missing_text_defaults_to_empty() {
        let msg: ChannelMessage =
            serde_json::from_value(json!({"channel": "C1", "user": "U1"})).unwrap();
        assert!(msg.text.is_empty());
    }
}
