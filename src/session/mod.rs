//! Session modules.
//!
//! - `manager`: owned connection lifecycle and the worker that drives it.
//! - `endpoint`: validated connection target.
//! - `event`: events delivered to the observer.
//! - `state`: lifecycle states.

use thiserror::Error;

/// Validated connection target.
pub mod endpoint;
/// Observer events.
pub mod event;
/// Session manager and its transport worker.
pub mod manager;
/// Connection lifecycle states.
pub mod state;

pub use endpoint::Endpoint;
pub use event::{InboundEvent, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use manager::{SessionManager, DEFAULT_CLOSE_TIMEOUT};
pub use state::ConnectionState;

/// Errors returned synchronously by session operations.
///
/// Transport failures after `connect` returns are delivered as
/// [`InboundEvent::Error`] instead.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Endpoint URI is malformed or not a websocket URI.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// `connect` called while a session is connecting, open or closing.
    #[error("session already active (state: {0})")]
    AlreadyConnected(ConnectionState),

    /// `send` called while the session is not open.
    #[error("session is not open")]
    NotConnected,

    /// `connect` called outside a tokio runtime.
    #[error("connect requires a running tokio runtime")]
    NoRuntime,

    /// Handshake or transport failure observed by the retry layer.
    #[error("connection failed: {0}")]
    ConnectFailed(String),
}
