//! switchboard CLI: run the dispatcher over JSON-lines events on stdin.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use switchboard_rs::Dispatcher;
use switchboard_rs::config::Config;
use switchboard_rs::model::ChannelMessage;
use switchboard_rs::status::LogStatusSink;
use switchboard_rs::telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "switchboard", about = "Chat event dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch JSON-lines events read from stdin until Ctrl-C
    Serve {
        /// Override workers spawned per channel
        #[arg(long)]
        workers_per_channel: Option<usize>,
        /// Override orchestrator pool size
        #[arg(long)]
        orchestrator_workers: Option<usize>,
        /// Override the debounce window (0 disables coalescing)
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// File that memory jobs are appended to, one JSON object per line
        #[arg(long, default_value = "memory.jsonl")]
        memory_log: PathBuf,
    },
    /// Print the effective dispatch configuration as TOML
    Config,
}

/// One line of input.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundEvent {
    Message(ChannelMessage),
    Orchestrator(serde_json::Map<String, Value>),
    Memory(serde_json::Map<String, Value>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            workers_per_channel,
            orchestrator_workers,
            debounce_ms,
            memory_log,
        } => {
            if let Some(n) = workers_per_channel {
                config.dispatch.workers_per_channel = n;
            }
            if let Some(n) = orchestrator_workers {
                config.dispatch.orchestrator_workers = n;
            }
            if let Some(ms) = debounce_ms {
                config.dispatch.debounce_ms = ms;
            }
            config.dispatch.validate()?;
            cmd_serve(config, memory_log).await
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config.dispatch)?);
            Ok(())
        }
    }
}

async fn cmd_serve(config: Config, memory_log: PathBuf) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "switchboard".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let settings = config.dispatch.clone();
    let dispatcher = Arc::new(Dispatcher::new(settings.clone(), Arc::new(LogStatusSink)));

    dispatcher.start_channel_workers(
        |message: ChannelMessage| async move {
            info!(
                channel = %message.channel,
                user = %message.user,
                text = %message.text,
                "message processed"
            );
            anyhow::Ok(())
        },
        settings.workers_per_channel,
    )?;

    dispatcher.start_orchestrator_workers(
        |job: Value| async move {
            let millis = job.get("duration_ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            info!(duration_ms = millis, "orchestrator job finished");
            anyhow::Ok(())
        },
        settings.orchestrator_workers,
    )?;

    let memory_log = Arc::new(memory_log);
    dispatcher.start_memory_worker(move |job: Value| {
        let path = Arc::clone(&memory_log);
        async move { append_json_line(&path, &job).await }
    })?;

    info!(
        workers_per_channel = settings.workers_per_channel,
        orchestrator_workers = settings.orchestrator_workers,
        debounce_ms = settings.debounce_ms,
        "switchboard serving stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if reading => match line? {
                Some(line) => {
                    if let Err(e) = route_line(&dispatcher, &line, settings.debounce_delay()).await {
                        warn!(error = %e, "failed to dispatch event");
                    }
                }
                None => {
                    info!("stdin closed, draining until Ctrl-C");
                    reading = false;
                }
            },
        }
    }

    dispatcher.shutdown().await;
    Ok(())
}

async fn route_line(dispatcher: &Dispatcher, line: &str, delay: Duration) -> anyhow::Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }
    let event = match serde_json::from_str::<InboundEvent>(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping malformed event");
            return Ok(());
        }
    };

    match event {
        InboundEvent::Message(message) => {
            dispatcher.debounced_enqueue_message(message, delay).await?
        }
        InboundEvent::Orchestrator(job) => {
            dispatcher.enqueue_orchestrator_job(Value::Object(job)).await?
        }
        InboundEvent::Memory(job) => dispatcher.enqueue_memory_job(Value::Object(job)).await?,
    }
    Ok(())
}

async fn append_json_line(path: &Path, job: &Value) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(job)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
