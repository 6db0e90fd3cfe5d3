use serde::{Deserialize, Serialize};

/// Wire names of the signals a peer understands or produces.
pub mod signals {
    pub const CREATED: &str = "created";
    pub const JOINED: &str = "joined";
    pub const OFFER_REQUEST: &str = "offerrequest";
    pub const ANSWER_REQUEST: &str = "answerrequest";
    pub const FINALIZE: &str = "finalize";
    pub const CANDIDATE: &str = "candidate";
    pub const PING: &str = "ping";
    pub const NEW_JOINED: &str = "newjoined";
    pub const ERROR: &str = "error";
    pub const END: &str = "end";

    pub const JOIN: &str = "join";
    pub const CREATE: &str = "create";
    pub const LEFT: &str = "left";
    pub const OFFER_RESPONSE: &str = "offerResponse";
    pub const ANSWER_RESPONSE: &str = "answerResponse";
}

/// Flat signaling record exchanged with the server.
///
/// Every field is optional on the wire. Build instances with
/// [`Message::builder`]; once built a message is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Start a message addressed back to the sender of `message`.
    pub fn reply_to(message: &Message) -> MessageBuilder {
        MessageBuilder {
            inner: Message {
                to: message.from.clone(),
                ..Message::default()
            },
        }
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Lower-cased signal used to look up a handler.
    pub fn dispatch_key(&self) -> Option<String> {
        self.signal.as_deref().map(str::to_lowercase)
    }

    pub fn is_keepalive(&self) -> bool {
        self.signal
            .as_deref()
            .is_some_and(|signal| signal.eq_ignore_ascii_case(signals::PING))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    inner: Message,
}

impl MessageBuilder {
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.inner.from = Some(from.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.inner.to = Some(to.into());
        self
    }

    pub fn signal(mut self, signal: impl Into<String>) -> Self {
        self.inner.signal = Some(signal.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.inner.content = Some(content.into());
        self
    }

    pub fn build(self) -> Message {
        self.inner
    }
}
