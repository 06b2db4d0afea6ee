use std::fmt;

/// Lifecycle position of a [`SessionManager`](crate::session::SessionManager).
///
/// A session moves `Idle → Connecting → Open → (Closing) → Closed`, with
/// `Failed` reachable from `Connecting` or `Open` on transport error.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Returns true for `Closed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// States from which a new session may be started.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Failed)
    }

    /// States in which `close` has an effect.
    pub fn can_close(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// States in which inbound payloads are still delivered to the observer.
    pub fn delivers_messages(self) -> bool {
        matches!(self, Self::Open | Self::Closing)
    }

    /// Returns the lowercase state name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState;

    #[test]
    fn new_sessions_start_from_idle_or_terminal_states() {
        assert!(ConnectionState::Idle.can_connect());
        assert!(ConnectionState::Closed.can_connect());
        assert!(ConnectionState::Failed.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Open.can_connect());
        assert!(!ConnectionState::Closing.can_connect());
    }

    #[test]
    fn messages_are_never_delivered_outside_a_live_connection() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Failed,
        ] {
            assert!(!state.delivers_messages(), "{state} must not deliver");
        }
        assert!(ConnectionState::Open.delivers_messages());
        assert!(ConnectionState::Closing.delivers_messages());
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
