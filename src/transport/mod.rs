//! Transport boundary wrapped by the session manager.
//!
//! - `websocket`: `tokio-tungstenite` client with rustls.
//! - `tls`: trust configuration for `wss://` endpoints.
//! - `memory`: in-process transport with a scriptable peer.

use async_trait::async_trait;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session::Endpoint;

/// In-process transport with a controllable peer.
pub mod memory;
/// TLS trust options.
pub mod tls;
/// Production websocket transport.
pub mod websocket;

pub use memory::{HandshakeMode, MemoryListener, MemoryPeer, MemoryTransport};
pub use tls::{TlsOptions, TlsVerifyMode};
pub use websocket::WebSocketTransport;

/// Frame surfaced by a transport connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// Peer started or confirmed the closing handshake.
    Close { code: u16, reason: String },
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: TransportConnection;

    /// Performs the opening handshake.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError>;
}

/// Bidirectional text-message socket.
///
/// `recv` must be cancel-safe: the session worker polls it inside `select!`.
#[async_trait]
pub trait TransportConnection: Send + 'static {
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError>;

    /// Next frame from the peer, or `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Result<TransportFrame, TransportError>>;

    /// Starts the closing handshake, or acknowledges one started by the peer.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Errors produced by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Websocket library error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// TLS client configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),

    /// Peer violated the text-socket contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Stream ended without a close frame.
    #[error("connection reset without close frame")]
    ConnectionReset,

    /// Peer refused the opening handshake.
    #[error("connection refused: {0}")]
    Refused(String),
}
