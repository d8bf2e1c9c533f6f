//! Error types for switchboard-rs.

use thiserror::Error;

use crate::model::Lane;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{lane} queue is closed")]
    QueueClosed { lane: Lane },

    #[error("{0} workers already started")]
    AlreadyStarted(Lane),

    #[error("channel limit reached: {limit} distinct routing keys")]
    ChannelLimit { limit: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
