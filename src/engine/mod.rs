//! Dispatch engine: channel lanes, debounce, orchestrator pool, writer lane.

mod channel;
pub mod debounce;
pub mod dispatcher;
pub mod orchestrator;
pub mod shutdown;
pub mod writer;
mod worker;

pub use debounce::Coalescer;
pub use dispatcher::Dispatcher;
pub use orchestrator::OrchestratorPool;
pub use shutdown::{ShutdownSender, ShutdownToken};
pub use writer::SequentialWriter;
