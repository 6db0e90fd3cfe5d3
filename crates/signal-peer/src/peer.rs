use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::actions::ActionTable;
use crate::codec;
use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::message::{signals, Message};
use crate::pool::{Completion, WorkerPool};
use crate::state::PeerState;
use crate::transport::SessionHandle;

/// What happened to an inbound message once its handler job ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// A handler ran to completion.
    Action,
    /// No handler is registered for the signal.
    Ignored,
}

/// What happened to an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Written,
    /// No session appeared before the send timeout.
    Abandoned,
}

/// One simulated participant in a signaling conversation.
///
/// Cheap to clone; clones share state, action table and worker pool.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    label: String,
    state: PeerState,
    actions: ActionTable,
    pool: WorkerPool,
    send_timeout: Duration,
}

impl Peer {
    pub fn new(label: impl Into<String>, pool: WorkerPool, config: &PeerConfig) -> Self {
        Self::with_actions(label, pool, config, ActionTable::standard())
    }

    pub fn with_actions(
        label: impl Into<String>,
        pool: WorkerPool,
        config: &PeerConfig,
        actions: ActionTable,
    ) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                label: label.into(),
                state: PeerState::new(),
                actions,
                pool,
                send_timeout: config.send_timeout,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> &PeerState {
        &self.inner.state
    }

    pub fn join(&self, name: &str) -> PeerResult<Completion<Delivery>> {
        self.send(Message::builder().signal(signals::JOIN).content(name).build())
    }

    pub fn create_conv(&self, name: &str) -> PeerResult<Completion<Delivery>> {
        self.send(Message::builder().signal(signals::CREATE).content(name).build())
    }

    pub fn leave(&self) -> PeerResult<Completion<Delivery>> {
        self.send(Message::builder().signal(signals::LEFT).build())
    }

    /// Transport connected: later and pending sends may write through `session`.
    pub fn on_connect(&self, session: SessionHandle) {
        self.inner.state.attach_session(session);
        info!(peer = %self.label(), "session connected");
    }

    /// Transport closed: drop the session and record the peer going offline.
    pub fn on_close(&self, status: u16, reason: &str) {
        self.inner.state.detach_session();
        self.inner
            .state
            .append_log(Message::builder().content(reason).build());
        info!(peer = %self.label(), status, reason, "session closed");
    }

    /// Decode a text frame from the transport and dispatch it.
    ///
    /// A frame that does not decode is recorded in the log and fault log and
    /// returned as [`PeerError::Decode`]; it never reaches a handler.
    pub fn on_inbound_text(&self, raw: &str) -> PeerResult<Completion<Handled>> {
        match codec::decode(raw) {
            Ok(message) => self.dispatch(message),
            Err(err) => {
                self.inner
                    .state
                    .append_log(Message::builder().content(err.to_string()).build());
                self.report_fault(&err);
                Err(err)
            }
        }
    }

    /// Log `message` unless it is a keepalive, then run its handler on the pool.
    pub fn dispatch(&self, message: Message) -> PeerResult<Completion<Handled>> {
        if !message.is_keepalive() {
            self.inner.state.append_log(message.clone());
        }

        let peer = self.clone();
        let submitted = self.inner.pool.submit(async move {
            let outcome = peer.run_action(&message);
            if let Err(err) = &outcome {
                peer.report_fault(err);
            }
            outcome
        });
        if let Err(err) = &submitted {
            self.report_fault(err);
        }
        submitted
    }

    fn run_action(&self, message: &Message) -> PeerResult<Handled> {
        let Some(key) = message.dispatch_key() else {
            debug!(peer = %self.label(), "inbound message without signal");
            return Ok(Handled::Ignored);
        };
        let Some(action) = self.inner.actions.get(&key) else {
            debug!(peer = %self.label(), signal = %key, "no handler for signal");
            return Ok(Handled::Ignored);
        };

        debug!(peer = %self.label(), signal = %key, from = ?message.from(), "running handler");
        action(self, self.inner.state.session(), message)?;
        Ok(Handled::Action)
    }

    /// Log `message` now and write it once a session is attached.
    ///
    /// The write waits at most the configured send timeout for a session and
    /// resolves to [`Delivery::Abandoned`] if none shows up.
    pub fn send(&self, message: Message) -> PeerResult<Completion<Delivery>> {
        self.inner.state.append_log(message.clone());

        let peer = self.clone();
        let submitted = self.inner.pool.submit(async move {
            let outcome = peer.deliver(message).await;
            if let Err(err) = &outcome {
                peer.report_fault(err);
            }
            outcome
        });
        if let Err(err) = &submitted {
            self.report_fault(err);
        }
        submitted
    }

    async fn deliver(&self, message: Message) -> PeerResult<Delivery> {
        let Some(session) = self.await_session().await else {
            warn!(
                peer = %self.label(),
                signal = ?message.signal(),
                timeout_ms = self.inner.send_timeout.as_millis() as u64,
                "no session before timeout; abandoning send"
            );
            return Ok(Delivery::Abandoned);
        };

        let text = codec::encode(&message)?;
        session.write_text(text).await?;
        debug!(peer = %self.label(), signal = ?message.signal(), to = ?message.to(), "message written");
        Ok(Delivery::Written)
    }

    async fn await_session(&self) -> Option<SessionHandle> {
        let mut sessions = self.inner.state.subscribe_session();
        let attached = time::timeout(
            self.inner.send_timeout,
            sessions.wait_for(|session| session.is_some()),
        )
        .await;
        match attached {
            Ok(Ok(session)) => (*session).clone(),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Resolve once an `end` signal has been handled.
    pub async fn terminated(&self) -> PeerError {
        let mut termination = self.inner.state.subscribe_termination();
        let reason = match termination.wait_for(|reason| reason.is_some()).await {
            Ok(reason) => (*reason).clone().unwrap_or_default(),
            Err(_) => String::new(),
        };
        PeerError::Terminated { reason }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.termination().is_some()
    }

    fn report_fault(&self, err: &PeerError) {
        match err {
            PeerError::Terminated { reason } => {
                error!(peer = %self.label(), reason = %reason, "session terminated by remote");
                self.inner.state.terminate(reason);
            }
            PeerError::Decode(_) => {
                warn!(peer = %self.label(), error = %err, "dropping undecodable message");
            }
            _ => {
                error!(peer = %self.label(), error = %err, "peer fault");
            }
        }
        self.inner.state.record_fault(err.clone());
    }
}
