/// Close code for a normal, requested teardown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Event delivered to the session observer, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// Text payload received from the peer.
    MessageReceived { payload: String },
    /// Handshake completed; the session is open.
    Opened,
    /// Connection torn down.
    Closed { code: u16, reason: String },
    /// Asynchronous transport failure.
    Error { description: String },
}

impl InboundEvent {
    /// Creates a `MessageReceived` event.
    pub fn message(payload: impl Into<String>) -> Self {
        Self::MessageReceived {
            payload: payload.into(),
        }
    }

    /// Creates a `Closed` event with the given close code and reason.
    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates an `Error` event.
    pub fn error(description: impl Into<String>) -> Self {
        Self::Error {
            description: description.into(),
        }
    }

    /// Short event name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message_received",
            Self::Opened => "opened",
            Self::Closed { .. } => "closed",
            Self::Error { .. } => "error",
        }
    }
}
