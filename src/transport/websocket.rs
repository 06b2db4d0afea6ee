//! Websocket transport over `tokio-tungstenite`.
//!
//! Ping frames are answered by tungstenite itself on the next read, so only
//! text and close frames reach the session.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::session::Endpoint;
use crate::transport::{
    TlsOptions, Transport, TransportConnection, TransportError, TransportFrame,
};

/// Websocket client transport.
///
/// Without explicit TLS options, `wss://` endpoints are verified against the
/// webpki root bundle.
#[derive(Clone, Default)]
pub struct WebSocketTransport {
    tls: Option<Arc<ClientConfig>>,
}

impl WebSocketTransport {
    /// Creates a transport that uses the default TLS trust for `wss://`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that applies `options` to `wss://` endpoints.
    pub fn with_tls(options: &TlsOptions) -> Result<Self, TransportError> {
        Ok(Self {
            tls: Some(options.client_config()?),
        })
    }

    fn connector(&self, endpoint: &Endpoint) -> Option<Connector> {
        if !endpoint.is_secure() {
            return Some(Connector::Plain);
        }
        self.tls
            .as_ref()
            .map(|config| Connector::Rustls(Arc::clone(config)))
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("custom_tls", &self.tls.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError> {
        let request = endpoint.as_str().into_client_request()?;
        let (socket, response) =
            connect_async_tls_with_config(request, None, false, self.connector(endpoint)).await?;
        debug!(
            event = "websocket_handshake_complete",
            endpoint = %endpoint,
            status = response.status().as_u16()
        );
        Ok(WebSocketConnection { socket })
    }
}

/// Open websocket connection.
pub struct WebSocketConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportConnection for WebSocketConnection {
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError> {
        self.socket.send(Message::Text(payload)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame, TransportError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(TransportFrame::Text(text))),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                        .unwrap_or((u16::from(CloseCode::Status), String::new()));
                    return Some(Ok(TransportFrame::Close { code, reason }));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Binary(_)) => {
                    return Some(Err(TransportError::Protocol(
                        "received binary frame on a text socket".to_string(),
                    )));
                }
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(err) => return Some(Err(TransportError::WebSocket(err))),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        match self.socket.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(TransportError::WebSocket(err)),
        }
    }
}
