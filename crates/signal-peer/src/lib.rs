//! Simulated signaling peer for load-testing a signaling server.
//!
//! A [`Peer`] logs every inbound frame on the delivery path, runs the handler
//! for its signal on a shared [`WorkerPool`], and routes replies through a
//! send gate that waits (bounded) for a live transport session.

pub mod actions;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod peer;
pub mod pool;
pub mod state;
pub mod transport;

pub use actions::{Action, ActionTable};
pub use config::PeerConfig;
pub use error::{PeerError, PeerResult};
pub use message::{signals, Message, MessageBuilder};
pub use peer::{Delivery, Handled, Peer};
pub use pool::{Completion, WorkerPool};
pub use state::{Binding, PeerState};
pub use transport::{Session, SessionHandle, TransportError};
