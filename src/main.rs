//! # Vigil — survival tier for an always-on agent host
//!
//! Three independent monitors, each a single sleep-check-act loop:
//!   - watchdog: keeps the gateway process alive, throttled restarts
//!   - oracle:   session-pressure risk scoring with an audit log
//!   - courier:  durable Telegram outbox with retry and dead-lettering
//!
//! Usage:
//!   vigil all                  # run all three loops in one process
//!   vigil watchdog             # run a single monitor
//!   vigil send "message"       # durably enqueue a notification
//!   vigil status               # outbox counts + last risk sample

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil_core::{VigilConfig, WalLog};
use vigil_courier::{Courier, Outbox};
use vigil_oracle::{CommandSessionSource, Oracle, RiskLog};
use vigil_watchdog::{Supervisor, SystemController};

#[derive(Parser)]
#[command(name = "vigil", version, about = "🛡️ Vigil — gateway survival tier")]
struct Cli {
    /// Config file (default ~/.vigil/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the process health supervisor
    Watchdog,
    /// Run the predictive risk sampler
    Oracle,
    /// Run the notification delivery queue
    Courier,
    /// Run all three monitors in one process
    All,
    /// Durably enqueue a message (delivered by the courier)
    Send {
        /// Destination chat id (default: the configured alert chat)
        #[arg(long)]
        chat: Option<String>,
        /// Message text
        text: Vec<String>,
    },
    /// Append an event to the session WAL
    Wal {
        event: String,
        /// JSON payload; plain strings are wrapped as-is
        payload: Option<String>,
    },
    /// Show outbox counts and the last risk sample
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => VigilConfig::load_from(std::path::Path::new(path))?,
        None => VigilConfig::load()?,
    };

    match cli.command {
        Command::Watchdog => {
            let outbox = open_outbox(&config)?;
            build_supervisor(&config, &outbox).run().await;
        }
        Command::Oracle => {
            let outbox = open_outbox(&config)?;
            build_oracle(&config, &outbox).run().await;
        }
        Command::Courier => {
            let outbox = open_outbox(&config)?;
            Courier::new(config.courier.clone(), outbox).run().await;
        }
        Command::All => {
            let outbox = open_outbox(&config)?;
            let supervisor = build_supervisor(&config, &outbox);
            let oracle = build_oracle(&config, &outbox);
            let courier = Courier::new(config.courier.clone(), outbox);

            tokio::spawn(supervisor.run());
            tokio::spawn(oracle.run());
            // courier runs on the main task; ctrl-c ends the process
            courier.run().await;
        }
        Command::Send { chat, text } => {
            let chat = chat
                .or_else(|| config.alert_chat().map(String::from))
                .ok_or_else(|| anyhow::anyhow!("No chat id: pass --chat or set alert_chat_id"))?;
            let body = text.join(" ");
            if body.is_empty() {
                anyhow::bail!("Empty message");
            }
            let outbox = open_outbox(&config)?;
            let id = outbox.enqueue(&chat, &body)?;
            println!("✅ Message {id} queued in outbox");
        }
        Command::Wal { event, payload } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw)),
                None => serde_json::Value::Null,
            };
            let wal = WalLog::new(&vigil_core::expand_path(&config.watchdog.wal_path));
            wal.append(&event, payload)?;
            println!("✅ WAL updated: {event}");
        }
        Command::Status => {
            let outbox = open_outbox(&config)?;
            let (pending, failed) = outbox.counts()?;
            println!("📬 Outbox: {pending} pending, {failed} failed");

            let risk_log = RiskLog::new(&vigil_core::expand_path(&config.oracle.risk_log));
            match risk_log.last() {
                Some(sample) => println!(
                    "🦅 Risk: {} ({:?}) — {} sessions at {}",
                    sample.score,
                    sample.status,
                    sample.sessions,
                    sample.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                None => println!("🦅 Risk: no samples yet"),
            }
        }
    }

    Ok(())
}

fn open_outbox(config: &VigilConfig) -> Result<Arc<Outbox>> {
    let path = vigil_core::expand_path(&config.courier.db_path);
    Ok(Arc::new(Outbox::open(&path)?))
}

fn build_supervisor(config: &VigilConfig, outbox: &Arc<Outbox>) -> Supervisor<SystemController> {
    let mut supervisor = Supervisor::new(config.watchdog.clone(), SystemController::new());
    if let Some(chat) = config.alert_chat() {
        supervisor = supervisor.with_alerts(outbox.clone(), chat.to_string());
    }
    supervisor
}

fn build_oracle(config: &VigilConfig, outbox: &Arc<Outbox>) -> Oracle {
    let source = CommandSessionSource::new(config.oracle.session_cmd.clone());
    let mut oracle = Oracle::new(config.oracle.clone(), Box::new(source));
    if let Some(chat) = config.alert_chat() {
        oracle = oracle.with_alerts(outbox.clone(), chat.to_string());
    }
    oracle
}
