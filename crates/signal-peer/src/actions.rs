use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{PeerError, PeerResult};
use crate::message::{signals, Message};
use crate::peer::Peer;
use crate::transport::SessionHandle;

/// Handler invoked for one inbound message.
///
/// Receives the peer it runs for and the session attached when the handler
/// started, if any.
pub type Action =
    Arc<dyn Fn(&Peer, Option<SessionHandle>, &Message) -> PeerResult<()> + Send + Sync>;

/// Case-insensitive signal name to handler mapping.
#[derive(Clone, Default)]
pub struct ActionTable {
    actions: HashMap<String, Action>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every signal a load-test peer answers to.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table
            .register(signals::CREATED, bind_identity)
            .register(signals::JOINED, bind_identity)
            .register(signals::OFFER_REQUEST, offer_request)
            .register(signals::ANSWER_REQUEST, answer_request)
            .register(signals::FINALIZE, finalize)
            .register(signals::CANDIDATE, candidate)
            .register(signals::PING, |_: &Peer, _, _: &Message| Ok(()))
            .register(signals::NEW_JOINED, new_joined)
            .register(signals::ERROR, error)
            .register(signals::END, end);
        table
    }

    /// Add or replace the handler for `signal`.
    pub fn register<F>(&mut self, signal: &str, action: F) -> &mut Self
    where
        F: Fn(&Peer, Option<SessionHandle>, &Message) -> PeerResult<()> + Send + Sync + 'static,
    {
        self.actions.insert(signal.to_lowercase(), Arc::new(action));
        self
    }

    pub fn get(&self, signal: &str) -> Option<&Action> {
        self.actions.get(&signal.to_lowercase())
    }

    pub fn contains(&self, signal: &str) -> bool {
        self.get(signal).is_some()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut signals: Vec<_> = self.actions.keys().collect();
        signals.sort();
        f.debug_struct("ActionTable").field("signals", &signals).finish()
    }
}

fn display_name(peer: &Peer) -> String {
    peer.state().name().unwrap_or_default()
}

fn bind_identity(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    peer.state().bind(
        message.to().map(str::to_owned),
        message.content().map(str::to_owned),
    );
    Ok(())
}

fn offer_request(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    let _ = peer.send(
        Message::reply_to(message)
            .signal(signals::OFFER_RESPONSE)
            .content(format!("offer from{}", display_name(peer)))
            .build(),
    )?;
    Ok(())
}

fn answer_request(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    let _ = peer.send(
        Message::reply_to(message)
            .signal(signals::ANSWER_RESPONSE)
            .content(format!("answer from{}", display_name(peer)))
            .build(),
    )?;
    Ok(())
}

fn finalize(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    let name = display_name(peer);
    for side in ["local", "remote"] {
        let _ = peer.send(
            Message::reply_to(message)
                .signal(signals::CANDIDATE)
                .content(format!("{side} candidate from {name}"))
                .build(),
        )?;
    }
    Ok(())
}

fn candidate(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    let content = message.content().unwrap_or_default();
    peer.state()
        .record_candidate(message.from().unwrap_or_default(), content);

    // answers are terminal; echoing them would ping-pong forever
    if !content.contains("answer") {
        let _ = peer.send(
            Message::reply_to(message)
                .signal(signals::CANDIDATE)
                .content(format!("answer from {} on {}", display_name(peer), content))
                .build(),
        )?;
    }
    Ok(())
}

fn new_joined(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    peer.state()
        .record_joined(message.content().unwrap_or_default());
    Ok(())
}

fn error(peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    peer.state()
        .record_error(message.content().unwrap_or_default());
    Ok(())
}

fn end(_peer: &Peer, _session: Option<SessionHandle>, message: &Message) -> PeerResult<()> {
    Err(PeerError::Terminated {
        reason: message.content().unwrap_or_default().to_string(),
    })
}
