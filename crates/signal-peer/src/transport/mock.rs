use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use super::{Session, TransportError};
use crate::codec;
use crate::message::Message;

/// In-memory session that records every write.
pub struct RecordingSession {
    writes: Mutex<Vec<String>>,
    written: watch::Sender<usize>,
    reject_with: Option<TransportError>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            written: watch::channel(0).0,
            reject_with: None,
        }
    }

    /// Session whose every write fails with `error`.
    pub fn rejecting(error: TransportError) -> Self {
        Self {
            reject_with: Some(error),
            ..Self::new()
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Writes decoded back into messages; undecodable frames are skipped.
    pub fn messages(&self) -> Vec<Message> {
        self.writes
            .lock()
            .iter()
            .filter_map(|text| codec::decode(text).ok())
            .collect()
    }

    /// Wait until at least `count` writes happened, or `within` elapses.
    pub async fn wait_for_writes(&self, count: usize, within: Duration) -> bool {
        let mut written = self.written.subscribe();
        let reached = tokio::time::timeout(within, written.wait_for(|n| *n >= count)).await;
        matches!(reached, Ok(Ok(_)))
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn write_text(&self, text: String) -> Result<(), TransportError> {
        if let Some(error) = &self.reject_with {
            return Err(error.clone());
        }
        self.writes.lock().push(text);
        self.written.send_modify(|n| *n += 1);
        Ok(())
    }
}
