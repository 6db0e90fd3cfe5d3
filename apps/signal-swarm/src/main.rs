mod cli;
mod swarm;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Default to INFO so the per-peer summary is visible without RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let summaries = swarm::run(&cli).await?;

    for summary in &summaries {
        info!(
            peer = %summary.label,
            name = ?summary.name,
            conversation = ?summary.joined_to,
            logged = summary.logged,
            candidates = summary.candidates,
            joined = summary.joined,
            errors = summary.errors,
            faults = summary.faults,
            connected = summary.connected,
            "peer summary"
        );
        if let Some(reason) = &summary.terminated {
            warn!(peer = %summary.label, reason = %reason, "peer was terminated");
        }
    }

    let terminated = summaries.iter().filter(|s| s.terminated.is_some()).count();
    let faulted = summaries.iter().filter(|s| s.faults > 0).count();
    info!(
        peers = summaries.len(),
        terminated,
        faulted,
        "swarm finished"
    );
    Ok(())
}
