use thiserror::Error;

use crate::transport::TransportError;

/// Failures a peer can observe while dispatching or sending.
///
/// `Terminated` is the remote ending this peer's session through an `end`
/// signal. It is intentional and never produced by decode or write paths.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("failed to decode inbound message: {0}")]
    Decode(String),
    #[error("failed to encode outbound message: {0}")]
    Encode(String),
    #[error("transport write failed: {0}")]
    Write(#[from] TransportError),
    #[error("transport failure: {0}")]
    Transport(TransportError),
    #[error("peer session terminated by remote: {reason}")]
    Terminated { reason: String },
    #[error("worker pool is closed")]
    PoolClosed,
    #[error("job cancelled before completion")]
    Cancelled,
    #[error("worker pool requires a running tokio runtime")]
    NoRuntime,
}

impl PeerError {
    pub fn is_terminated(&self) -> bool {
        matches!(self, PeerError::Terminated { .. })
    }

    /// Reason carried by an `end` signal, if this is a termination.
    pub fn termination_reason(&self) -> Option<&str> {
        match self {
            PeerError::Terminated { reason } => Some(reason),
            _ => None,
        }
    }
}

pub type PeerResult<T> = Result<T, PeerError>;
