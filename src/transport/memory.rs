//! In-memory transport.
//!
//! Every accepted handshake produces a [`MemoryPeer`] that plays the server
//! side of the connection. Useful for exercising observers without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::Endpoint;
use crate::transport::{Transport, TransportConnection, TransportError, TransportFrame};

/// How the memory transport answers opening handshakes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum HandshakeMode {
    /// Complete the handshake and hand a peer to the listener.
    #[default]
    Accept,
    /// Fail the handshake with the given description.
    Refuse(String),
    /// Never complete the handshake.
    Stall,
}

/// Transport whose connections terminate in the test process.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    mode: Mutex<HandshakeMode>,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Receives the server side of each accepted connection.
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next accepted connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }
}

impl MemoryTransport {
    /// Creates a transport and the listener that receives its peers.
    pub fn new() -> (Self, MemoryListener) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(Inner {
                mode: Mutex::new(HandshakeMode::Accept),
                attempts: AtomicUsize::new(0),
                accepted: accepted_tx,
            }),
        };
        (
            transport,
            MemoryListener {
                accepted: accepted_rx,
            },
        )
    }

    /// Changes how subsequent handshakes are answered.
    pub fn set_mode(&self, mode: HandshakeMode) {
        match self.inner.mode.lock() {
            Ok(mut guard) => *guard = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    /// Number of handshakes attempted so far.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    fn mode(&self) -> HandshakeMode {
        match self.inner.mode.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(event = "memory_handshake", endpoint = %endpoint, attempt);

        match self.mode() {
            HandshakeMode::Accept => {}
            HandshakeMode::Refuse(reason) => return Err(TransportError::Refused(reason)),
            HandshakeMode::Stall => std::future::pending::<()>().await,
        }

        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            inbound: to_peer_rx,
            outbound: to_client_tx,
        };
        self.inner
            .accepted
            .send(peer)
            .map_err(|_| TransportError::Refused("memory listener dropped".to_string()))?;

        Ok(MemoryConnection {
            to_peer: to_peer_tx,
            from_peer: to_client_rx,
        })
    }
}

/// Client side of a memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    to_peer: mpsc::UnboundedSender<TransportFrame>,
    from_peer: mpsc::UnboundedReceiver<Result<TransportFrame, TransportError>>,
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError> {
        self.to_peer
            .send(TransportFrame::Text(payload))
            .map_err(|_| TransportError::ConnectionReset)
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame, TransportError>> {
        self.from_peer.recv().await
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        // A peer that already went away has nothing left to acknowledge.
        let _ = self.to_peer.send(TransportFrame::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

/// Server side of a memory connection.
///
/// Dropping the peer ends the client's stream without a close frame.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedReceiver<TransportFrame>,
    outbound: mpsc::UnboundedSender<Result<TransportFrame, TransportError>>,
}

impl MemoryPeer {
    /// Next frame written by the client.
    pub async fn recv(&mut self) -> Option<TransportFrame> {
        self.inbound.recv().await
    }

    /// Frame already written by the client, if any.
    pub fn try_recv(&mut self) -> Option<TransportFrame> {
        self.inbound.try_recv().ok()
    }

    /// Sends a text frame to the client. Returns false once the client is gone.
    pub fn send_text(&self, payload: impl Into<String>) -> bool {
        self.outbound
            .send(Ok(TransportFrame::Text(payload.into())))
            .is_ok()
    }

    /// Sends a close frame to the client.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.outbound
            .send(Ok(TransportFrame::Close {
                code,
                reason: reason.into(),
            }))
            .is_ok()
    }

    /// Injects a transport error into the client's receive path.
    pub fn fail(&self, description: impl Into<String>) -> bool {
        self.outbound
            .send(Err(TransportError::Protocol(description.into())))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::{HandshakeMode, MemoryTransport};
    use crate::session::Endpoint;
    use crate::transport::{Transport, TransportConnection, TransportError, TransportFrame};

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://memory.local/chat").expect("endpoint")
    }

    #[tokio::test]
    async fn accepted_connection_pairs_client_and_peer() {
        let (transport, mut listener) = MemoryTransport::new();
        let mut conn = transport.connect(&endpoint()).await.expect("connect");
        let mut peer = listener.accept().await.expect("peer");

        conn.send_text("login alice".to_string()).await.expect("send");
        assert_eq!(
            peer.recv().await,
            Some(TransportFrame::Text("login alice".to_string()))
        );

        assert!(peer.send_text("Welcome"));
        let frame = conn.recv().await.expect("frame").expect("ok frame");
        assert_eq!(frame, TransportFrame::Text("Welcome".to_string()));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn refused_handshake_reports_reason() {
        let (transport, _listener) = MemoryTransport::new();
        transport.set_mode(HandshakeMode::Refuse("port closed".to_string()));
        let err = transport.connect(&endpoint()).await.err().expect("refused");
        assert!(matches!(err, TransportError::Refused(reason) if reason == "port closed"));
    }

    #[tokio::test]
    async fn dropped_peer_ends_client_stream() {
        let (transport, mut listener) = MemoryTransport::new();
        let mut conn = transport.connect(&endpoint()).await.expect("connect");
        drop(listener.accept().await.expect("peer"));

        assert!(conn.recv().await.is_none());
        assert!(matches!(
            conn.send_text("late".to_string()).await,
            Err(TransportError::ConnectionReset)
        ));
    }
}
