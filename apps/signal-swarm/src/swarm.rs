use anyhow::Result;
use signal_peer::transport::websocket;
use signal_peer::{Peer, PeerError, PeerResult, WorkerPool};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tracing::{debug, info, warn};

use crate::cli::Cli;

/// How long connections get to close on their own before they are aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// What one peer accumulated over a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub label: String,
    pub name: Option<String>,
    pub joined_to: Option<String>,
    pub logged: usize,
    pub candidates: usize,
    pub joined: usize,
    pub errors: usize,
    pub faults: usize,
    pub connected: bool,
    pub terminated: Option<String>,
}

impl PeerSummary {
    pub fn capture(peer: &Peer) -> Self {
        let state = peer.state();
        let binding = state.binding();
        Self {
            label: peer.label().to_string(),
            name: binding.name,
            joined_to: binding.joined_to,
            logged: state.log_len(),
            candidates: state.candidates().values().map(Vec::len).sum(),
            joined: state.joined().len(),
            errors: state.errors().len(),
            faults: state.faults().len(),
            connected: state.is_connected(),
            terminated: state.termination(),
        }
    }
}

/// Connect every peer, create/join the conversation, let them negotiate for
/// the configured duration, then leave and tear down.
pub async fn run(cli: &Cli) -> Result<Vec<PeerSummary>> {
    let config = cli.peer_config();
    let pool = WorkerPool::new(config.workers)?;
    info!(
        peers = cli.peers,
        workers = pool.size(),
        send_timeout_ms = config.send_timeout.as_millis() as u64,
        "starting swarm against {}",
        cli.url
    );

    let peers: Vec<Peer> = (0..cli.peers)
        .map(|index| Peer::new(format!("peer-{index}"), pool.clone(), &config))
        .collect();

    let (stop, stopped) = watch::channel(false);
    let mut connections = JoinSet::new();
    for peer in &peers {
        let peer = peer.clone();
        let url = cli.url.clone();
        let mut stopped = stopped.clone();
        connections.spawn(async move {
            let shutdown = async move {
                let _ = stopped.wait_for(|stop| *stop).await;
            };
            let outcome = websocket::connect_and_run_until(&peer, &url, shutdown).await;
            (peer.label().to_string(), outcome)
        });
    }

    // sends issued here wait in the gate until each socket is up
    for (index, peer) in peers.iter().enumerate() {
        let _ = if index == 0 {
            peer.create_conv(&cli.conversation)?
        } else {
            peer.join(&cli.conversation)?
        };
    }

    tokio::time::sleep(cli.run_for()).await;

    for peer in peers.iter().filter(|peer| !peer.is_terminated()) {
        match peer.leave()?.wait().await {
            Ok(delivery) => debug!(peer = %peer.label(), ?delivery, "leave sent"),
            Err(err) => warn!(peer = %peer.label(), error = %err, "leave failed"),
        }
    }

    stop.send_replace(true);
    let closed = time::timeout(CLOSE_GRACE, async {
        while let Some(joined) = connections.join_next().await {
            report_exit(joined);
        }
    })
    .await;
    if closed.is_err() {
        warn!(remaining = connections.len(), "connections did not close in time; aborting");
        connections.abort_all();
        while let Some(joined) = connections.join_next().await {
            report_exit(joined);
        }
    }
    pool.shutdown().await;

    Ok(peers.iter().map(PeerSummary::capture).collect())
}

fn report_exit(joined: Result<(String, PeerResult<()>), JoinError>) {
    match joined {
        Ok((label, Err(PeerError::Terminated { reason }))) => {
            info!(peer = %label, reason = %reason, "peer terminated by server")
        }
        Ok((label, Err(err))) => warn!(peer = %label, error = %err, "peer connection failed"),
        Ok((label, Ok(()))) => debug!(peer = %label, "peer connection closed"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!(error = %err, "peer connection task panicked"),
    }
}
