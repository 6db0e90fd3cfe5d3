use clap::Parser;
use signal_peer::PeerConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "signal-swarm")]
#[command(about = "Drive simulated peers against a signaling server")]
pub struct Cli {
    /// Signaling server WebSocket URL (e.g., ws://localhost:8080/signaling)
    #[arg(short, long, env = "SIGNAL_SWARM_URL")]
    pub url: String,

    /// Number of simulated peers
    #[arg(short, long, env = "SIGNAL_SWARM_PEERS", default_value_t = 2)]
    pub peers: usize,

    /// Conversation the first peer creates and the rest join
    #[arg(short, long, env = "SIGNAL_SWARM_CONVERSATION", default_value = "load-test")]
    pub conversation: String,

    /// Seconds to let the peers negotiate before they leave
    #[arg(short, long, env = "SIGNAL_SWARM_DURATION", default_value_t = 10)]
    pub duration: u64,

    /// Worker tasks shared by every peer (default: SIGNAL_PEER_WORKERS or 4)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Milliseconds a send waits for a session (default: SIGNAL_PEER_SEND_TIMEOUT_MS or 1000)
    #[arg(long)]
    pub send_timeout_ms: Option<u64>,
}

impl Cli {
    pub fn peer_config(&self) -> PeerConfig {
        let mut config = PeerConfig::from_env();
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(millis) = self.send_timeout_ms {
            config = config.with_send_timeout(Duration::from_millis(millis));
        }
        config
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn flags_override_peer_config() {
        let cli = Cli::parse_from([
            "signal-swarm",
            "--url",
            "ws://127.0.0.1:9000/signaling",
            "--peers",
            "5",
            "--workers",
            "2",
            "--send-timeout-ms",
            "300",
        ]);
        assert_eq!(cli.peers, 5);
        assert_eq!(cli.conversation, "load-test");
        let config = cli.peer_config();
        assert_eq!(config.workers, 2);
        assert_eq!(config.send_timeout, Duration::from_millis(300));
    }
}
