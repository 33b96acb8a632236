use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::{
    io::{BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use group_reconciler::{
    app::{
        GroupProcessor, InMemoryProvider, LogNotifier, ProcessorConfig, TaskError, TaskExecutor,
        TokioTaskRunner,
    },
    core::{AvatarPointer, Direction, EventKind, GroupEvent, GroupId},
    ds::OutboundPacket,
    storage::{MemoryHistoryStore, MemoryRosterStore, MemoryThreadStore},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a JSON-lines file of control events and print the resulting rosters
    Replay {
        events: PathBuf,
        /// JSON processor config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// One line of a replay file.
#[derive(Deserialize, Debug)]
struct ReplayEvent {
    #[serde(with = "hex::serde")]
    group_id: Vec<u8>,
    kind: EventKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<AvatarPointer>,
    #[serde(default)]
    members: Option<Vec<String>>,
    sender: String,
    #[serde(default = "default_device")]
    device: u32,
    #[serde(default)]
    relay: Option<String>,
    timestamp: u64,
    #[serde(default)]
    outgoing: bool,
}

fn default_device() -> u32 {
    1
}

impl From<ReplayEvent> for GroupEvent {
    fn from(line: ReplayEvent) -> Self {
        GroupEvent {
            group_id: GroupId::new(line.group_id),
            kind: line.kind,
            name: line.name,
            avatar: line.avatar,
            members: line.members,
            sender: line.sender,
            sender_device: line.device,
            relay: line.relay,
            timestamp: line.timestamp,
            direction: if line.outgoing {
                Direction::Outgoing
            } else {
                Direction::Incoming
            },
        }
    }
}

/// Executor that logs side effects instead of performing them.
struct LogExecutor;

#[async_trait]
impl TaskExecutor for LogExecutor {
    async fn fetch_avatar(
        &self,
        group_id: &GroupId,
        pointer: &AvatarPointer,
    ) -> Result<(), TaskError> {
        info!("[fetch_avatar]: group {group_id} avatar {}", pointer.id);
        Ok(())
    }

    async fn push_roster(&self, packet: OutboundPacket) -> Result<(), TaskError> {
        info!(
            "[push_roster]: {} bytes of group {} to {}",
            packet.payload.len(),
            packet.group_id,
            packet.recipient
        );
        Ok(())
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn replay(events: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let config = match config {
        Some(path) => ProcessorConfig::from_json_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProcessorConfig::default(),
    };

    let (runner, worker) = TokioTaskRunner::spawn(Arc::new(LogExecutor), config.runner.clone());
    let processor: GroupProcessor<InMemoryProvider> = GroupProcessor::new(
        Arc::new(MemoryRosterStore::new()),
        Arc::new(MemoryThreadStore::new()),
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(LogNotifier),
        Arc::new(runner),
        &config,
    );

    let file = std::fs::File::open(&events)
        .with_context(|| format!("opening {}", events.display()))?;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("[replay]: skipping line {}: {e}", number + 1);
                continue;
            }
        };
        match processor.process(event.into()).await {
            Some(thread) => info!("[replay]: line {} recorded in thread {thread}", number + 1),
            None => info!("[replay]: line {} recorded nothing", number + 1),
        }
    }

    let records = processor.roster().records()?;
    println!("{}", serde_json::to_string_pretty(&records)?);

    // Dropping the processor closes the runner queue.
    drop(processor);
    worker.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::Replay { events, config } => replay(events, config).await,
    }
}
