//! # switchboard-rs
//!
//! Dispatch and coordination layer between an inbound chat event source and
//! slow, stateful processing functions.
//!
//! Provides per-channel worker lanes with lazy queue creation, a debounce
//! coalescer for message bursts, a bounded orchestrator pool that broadcasts
//! busy/idle presence, and a single-writer lane for order-sensitive
//! persistence.

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod model;
pub mod queue;
pub mod registry;
pub mod status;
pub mod telemetry;

pub use engine::Dispatcher;
