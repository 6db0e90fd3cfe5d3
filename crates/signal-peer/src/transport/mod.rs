use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod mock;
pub mod websocket;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("session closed")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Io(String),
}

/// Live transport session a peer writes through.
///
/// The peer never inspects a session beyond holding it; presence of a handle
/// is what "connected" means.
#[async_trait]
pub trait Session: Send + Sync {
    /// Write one text frame.
    async fn write_text(&self, text: String) -> Result<(), TransportError>;
}

pub type SessionHandle = Arc<dyn Session>;
