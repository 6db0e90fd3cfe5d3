use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tokio::sync::watch;

use crate::error::PeerError;
use crate::message::Message;
use crate::transport::SessionHandle;

/// Identity and conversation assigned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    pub name: Option<String>,
    pub joined_to: Option<String>,
}

/// Everything a peer accumulates while it runs.
///
/// Each collection is guarded on its own so handlers running on different
/// workers only contend on the collection they touch.
pub struct PeerState {
    binding: RwLock<Binding>,
    /// remote peer id -> candidate payloads in append order
    candidates: DashMap<String, Vec<String>>,
    joined: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    log: Mutex<Vec<Message>>,
    faults: Mutex<Vec<PeerError>>,
    session: watch::Sender<Option<SessionHandle>>,
    termination: watch::Sender<Option<String>>,
}

impl PeerState {
    pub fn new() -> Self {
        Self {
            binding: RwLock::new(Binding::default()),
            candidates: DashMap::new(),
            joined: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            session: watch::channel(None).0,
            termination: watch::channel(None).0,
        }
    }

    /// Replace name and conversation together.
    pub fn bind(&self, name: Option<String>, joined_to: Option<String>) {
        *self.binding.write() = Binding { name, joined_to };
    }

    pub fn binding(&self) -> Binding {
        self.binding.read().clone()
    }

    pub fn name(&self) -> Option<String> {
        self.binding.read().name.clone()
    }

    pub fn joined_to(&self) -> Option<String> {
        self.binding.read().joined_to.clone()
    }

    /// Append a candidate from `from`, returning how many it has now sent.
    pub fn record_candidate(&self, from: &str, content: &str) -> usize {
        let mut entry = self.candidates.entry(from.to_string()).or_default();
        entry.push(content.to_string());
        entry.len()
    }

    pub fn candidates_from(&self, from: &str) -> Vec<String> {
        self.candidates
            .get(from)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn candidates(&self) -> HashMap<String, Vec<String>> {
        self.candidates
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn record_joined(&self, peer: &str) {
        self.joined.lock().push(peer.to_string());
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().clone()
    }

    pub fn record_error(&self, content: &str) {
        self.errors.lock().push(content.to_string());
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn append_log(&self, message: Message) {
        self.log.lock().push(message);
    }

    pub fn log(&self) -> Vec<Message> {
        self.log.lock().clone()
    }

    pub fn log_len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn record_fault(&self, fault: PeerError) {
        self.faults.lock().push(fault);
    }

    pub fn faults(&self) -> Vec<PeerError> {
        self.faults.lock().clone()
    }

    pub fn attach_session(&self, session: SessionHandle) {
        self.session.send_replace(Some(session));
    }

    pub fn detach_session(&self) -> Option<SessionHandle> {
        self.session.send_replace(None)
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session.borrow().is_some()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<SessionHandle>> {
        self.session.subscribe()
    }

    /// Record the first termination reason; later ones are ignored.
    pub fn terminate(&self, reason: &str) {
        self.termination.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.to_string());
            true
        });
    }

    pub fn termination(&self) -> Option<String> {
        self.termination.borrow().clone()
    }

    pub fn subscribe_termination(&self) -> watch::Receiver<Option<String>> {
        self.termination.subscribe()
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}
