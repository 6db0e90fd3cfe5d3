use std::env;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Worker tasks shared by handler execution and send waiting.
    pub workers: usize,
    /// How long a send waits for a session before it is abandoned.
    pub send_timeout: Duration,
}

impl PeerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workers = lookup("SIGNAL_PEER_WORKERS")
            .and_then(|val| val.parse().ok())
            .filter(|workers: &usize| *workers > 0)
            .unwrap_or(DEFAULT_WORKERS);
        let send_timeout = lookup("SIGNAL_PEER_SEND_TIMEOUT_MS")
            .and_then(|val| val.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SEND_TIMEOUT);

        Self {
            workers,
            send_timeout,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}
