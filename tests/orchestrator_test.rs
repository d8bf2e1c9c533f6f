//! Orchestrator pool: busy/idle accounting and status broadcasts.

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_rs::Dispatcher;
use switchboard_rs::handler::Handler;
use switchboard_rs::model::Status;
use switchboard_rs::status::SinkError;
use tokio::sync::mpsc;
use tokio::time::sleep;

use support::{RecordingSink, recv_n};

/// Sleeps for `sleep_ms`, reports the job, then fails if `fail` is set.
struct SleepingJobs {
    done: mpsc::UnboundedSender<Value>,
}

#[async_trait]
impl Handler<Value> for SleepingJobs {
    async fn handle(&self, job: Value) -> anyhow::Result<()> {
        let millis = job["sleep_ms"].as_u64().unwrap_or(0);
        sleep(Duration::from_millis(millis)).await;
        let fail = job["fail"].as_bool().unwrap_or(false);
        self.done.send(job)?;
        if fail {
            anyhow::bail!("orchestrator job failed");
        }
        Ok(())
    }
}

fn sleeping_handler(done: mpsc::UnboundedSender<Value>) -> SleepingJobs {
    SleepingJobs { done }
}

#[tokio::test(start_paused = true)]
async fn two_concurrent_jobs_flip_status_busy_then_idle() {
    let sink = RecordingSink::new();
    let dispatcher = Dispatcher::new(support::config(), sink.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher
        .start_orchestrator_workers(sleeping_handler(tx), 2)
        .unwrap();

    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 1000}))
        .await
        .unwrap();
    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 1000}))
        .await
        .unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(dispatcher.orchestrator().active_count().await, 2);
    assert_eq!(dispatcher.orchestrator().status().await, Status::Busy);

    recv_n(&mut rx, 2).await;
    let statuses = sink.wait_for(4).await;
    assert_eq!(
        statuses,
        vec![Status::Idle, Status::Busy, Status::Idle, Status::Idle]
    );
    assert_eq!(dispatcher.orchestrator().active_count().await, 0);
    assert_eq!(dispatcher.orchestrator().status().await, Status::Idle);
}

#[tokio::test(start_paused = true)]
async fn single_job_never_reports_busy() {
    let sink = RecordingSink::new();
    let dispatcher = Dispatcher::new(support::config(), sink.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher
        .start_orchestrator_workers(sleeping_handler(tx), 2)
        .unwrap();

    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 100}))
        .await
        .unwrap();
    recv_n(&mut rx, 1).await;

    assert_eq!(sink.wait_for(2).await, vec![Status::Idle, Status::Idle]);
}

#[tokio::test(start_paused = true)]
async fn one_worker_pool_is_busy_while_working() {
    let sink = RecordingSink::new();
    let dispatcher = Dispatcher::new(support::config(), sink.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher
        .start_orchestrator_workers(sleeping_handler(tx), 1)
        .unwrap();

    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 100}))
        .await
        .unwrap();
    recv_n(&mut rx, 1).await;

    assert_eq!(sink.wait_for(2).await, vec![Status::Busy, Status::Idle]);
}

#[tokio::test(start_paused = true)]
async fn sink_failures_do_not_affect_jobs() {
    for failure in [
        (|| SinkError::Unsupported("missing profile scope".to_string())) as fn() -> SinkError,
        (|| SinkError::Failed("rate limited".to_string())) as fn() -> SinkError,
    ] {
        let sink = RecordingSink::failing(failure);
        let dispatcher = Dispatcher::new(support::config(), sink.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher
            .start_orchestrator_workers(sleeping_handler(tx), 2)
            .unwrap();

        for _ in 0..3 {
            dispatcher
                .enqueue_orchestrator_job(json!({"sleep_ms": 10}))
                .await
                .unwrap();
        }

        assert_eq!(recv_n(&mut rx, 3).await.len(), 3);
        assert_eq!(sink.wait_for(6).await.len(), 6);
        assert_eq!(dispatcher.orchestrator().active_count().await, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn failed_job_still_releases_its_worker() {
    let sink = RecordingSink::new();
    let dispatcher = Dispatcher::new(support::config(), sink.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher
        .start_orchestrator_workers(sleeping_handler(tx), 1)
        .unwrap();

    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 10, "fail": true}))
        .await
        .unwrap();
    dispatcher
        .enqueue_orchestrator_job(json!({"sleep_ms": 10, "id": 2}))
        .await
        .unwrap();

    let jobs = recv_n(&mut rx, 2).await;
    assert_eq!(jobs[1]["id"], 2);
    assert_eq!(
        sink.wait_for(4).await,
        vec![Status::Busy, Status::Idle, Status::Busy, Status::Idle]
    );
    assert_eq!(dispatcher.orchestrator().active_count().await, 0);
}

#[tokio::test]
async fn pool_is_idle_before_workers_start() {
    let sink = RecordingSink::new();
    let dispatcher = Dispatcher::new(support::config(), sink.clone());

    assert_eq!(dispatcher.orchestrator().status().await, Status::Idle);
    assert_eq!(dispatcher.orchestrator().active_count().await, 0);
    assert!(sink.statuses().is_empty());
}
