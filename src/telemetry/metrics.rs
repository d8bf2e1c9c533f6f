//! Metric instrument factories for switchboard-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"switchboard-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

/// Returns the shared meter for switchboard-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("switchboard-rs")
}

/// Counter: jobs accepted into a queue.
/// Labels: `lane` ("channel" | "orchestrator" | "memory").
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("switchboard.jobs.enqueued")
        .with_description("Number of jobs accepted into a queue")
        .build()
}

/// Counter: jobs taken off a queue and handed to a handler.
/// Labels: `lane`, `result` ("ok" | "error" | "panic").
pub fn jobs_processed() -> Counter<u64> {
    meter()
        .u64_counter("switchboard.jobs.processed")
        .with_description("Number of jobs processed by workers")
        .build()
}

/// Histogram: time a job spent queued before a worker picked it up.
/// Labels: `lane`.
pub fn queue_wait_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("switchboard.queue.wait_ms")
        .with_description("Time between enqueue and dequeue")
        .with_unit("ms")
        .build()
}

/// Histogram: handler execution time.
/// Labels: `lane`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("switchboard.job.duration_ms")
        .with_description("Handler execution time")
        .with_unit("ms")
        .build()
}

/// Counter: channel queues created.
pub fn channels_created() -> Counter<u64> {
    meter()
        .u64_counter("switchboard.channels.created")
        .with_description("Number of channel queues created")
        .build()
}

/// Counter: debounce timers that expired and merged a burst.
/// Labels: `result` ("forwarded" | "empty" | "error").
pub fn debounce_merges() -> Counter<u64> {
    meter()
        .u64_counter("switchboard.debounce.merges")
        .with_description("Number of debounced bursts merged")
        .build()
}

/// Counter: status pushes to the presence sink.
/// Labels: `status` ("busy" | "idle"), `result` ("ok" | "unsupported" | "error").
pub fn status_broadcasts() -> Counter<u64> {
    meter()
        .u64_counter("switchboard.status.broadcasts")
        .with_description("Number of status broadcasts")
        .build()
}

/// Up/down counter: orchestrator workers currently running a job.
pub fn orchestrator_active() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("switchboard.orchestrator.active")
        .with_description("Orchestrator workers currently running a job")
        .build()
}
