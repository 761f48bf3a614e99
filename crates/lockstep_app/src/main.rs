//! # lockstep_app
//!
//! Runs a demo session: one authoritative server and a few clients, each on
//! its own task with its own copy of the simulation. One client can be told
//! to nudge its state at a given frame; the session shows the divergence
//! being caught by hash comparison and repaired from a full state snapshot.

mod config;
mod game;
mod session;
mod tick;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "lockstep_app", about = "Deterministic lockstep simulation demo")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of clients
    #[arg(long)]
    clients: Option<usize>,

    /// Frames the server runs
    #[arg(long)]
    ticks: Option<u64>,

    /// Ticks per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Frame at which client 0 diverges
    #[arg(long)]
    desync_frame: Option<u64>,

    /// Run without an injected divergence
    #[arg(long)]
    no_desync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lockstep_app=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(clients) = args.clients {
        config.session.clients = clients;
    }
    if let Some(ticks) = args.ticks {
        config.tick.max_ticks = ticks;
    }
    if let Some(rate) = args.tick_rate {
        config.tick.tick_rate = rate;
    }
    if let Some(frame) = args.desync_frame {
        config.session.desync_frame = Some(frame);
    }
    if args.no_desync {
        config.session.desync_client = None;
    }

    info!(
        clients = config.session.clients,
        players = config.session.players,
        ticks = config.tick.max_ticks,
        "lockstep session starting"
    );
    let report = session::run(config).await?;

    for client in &report.clients {
        if client.frame == report.frame && client.hash != report.hash {
            warn!(client = client.id, frame = client.frame, "client ended out of sync");
        } else {
            info!(
                client = client.id,
                frame = client.frame,
                desyncs = client.desyncs,
                resyncs = client.resyncs,
                rollbacks = client.rollbacks,
                "client summary"
            );
        }
    }
    info!(frame = report.frame, hash = report.hash, "session complete");
    Ok(())
}
