//! Owned websocket session and its connection worker.
//!
//! `connect` spawns a worker task that owns the transport connection. The
//! worker is the only writer of the transport and the only caller of the
//! observer, so events reach the observer one at a time and in arrival order.
//! Lifecycle transitions made by the worker happen under the observer lock
//! together with the event they produce.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::session::{
    ConnectionState, Endpoint, InboundEvent, SessionError, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use crate::transport::{
    Transport, TransportConnection, TransportError, TransportFrame, WebSocketTransport,
};

type Observer = Box<dyn FnMut(InboundEvent) + Send + 'static>;

/// How long a client-initiated close waits for the peer's close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Owns one logical connection to a remote endpoint.
///
/// Operations take `&self` but are meant to be called from one logical
/// caller at a time; see the crate docs for the ordering guarantees.
pub struct SessionManager<T: Transport = WebSocketTransport> {
    transport: Arc<T>,
    shared: Arc<Shared>,
    endpoint: Mutex<Option<Endpoint>>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    close_timeout: Duration,
}

impl SessionManager<WebSocketTransport> {
    /// Creates an idle manager backed by the default websocket transport.
    pub fn websocket() -> Self {
        Self::new(WebSocketTransport::new())
    }
}

impl<T: Transport> SessionManager<T> {
    /// Creates an idle manager that owns `transport`.
    pub fn new(transport: T) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport: Arc::new(transport),
            shared: Arc::new(Shared {
                state,
                observer: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
            endpoint: Mutex::new(None),
            commands: Mutex::new(None),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets how long a close waits for the peer to answer the close frame.
    ///
    /// When it elapses the connection is dropped and `Closed` carries
    /// `CLOSE_ABNORMAL`.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Returns the transport this manager connects through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Endpoint of the current or most recent session.
    pub fn endpoint(&self) -> Option<Endpoint> {
        lock(&self.endpoint).clone()
    }

    /// Description of the most recent transport failure.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// Registers the observer that receives every [`InboundEvent`].
    ///
    /// Replaces any previous observer. Must not be called from inside the
    /// observer itself.
    pub fn on_event<F>(&self, observer: F)
    where
        F: FnMut(InboundEvent) + Send + 'static,
    {
        *self.shared.lock_observer() = Some(Box::new(observer));
    }

    /// Registers an observer that forwards events into a channel.
    pub fn event_stream(&self) -> mpsc::UnboundedReceiver<InboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_event(move |event| {
            let _ = tx.send(event);
        });
        rx
    }

    /// Starts a session against `endpoint`.
    ///
    /// Returns once the state is `Connecting`; the handshake runs on a
    /// background task and its outcome arrives as `Opened` or `Error`.
    /// Accepted from `Idle` and from the terminal states.
    pub fn connect(&self, endpoint: &str) -> Result<(), SessionError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut previous = ConnectionState::Idle;
        let started = self.shared.state.send_if_modified(|state| {
            previous = *state;
            if state.can_connect() {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SessionError::AlreadyConnected(previous));
        }

        debug!(
            event = "session_connecting",
            endpoint = %endpoint,
            previous = %previous
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *lock(&self.commands) = Some(command_tx);
        *lock(&self.endpoint) = Some(endpoint.clone());
        *lock(&self.shared.last_error) = None;

        runtime.spawn(session_worker(
            Arc::clone(&self.transport),
            endpoint,
            Arc::clone(&self.shared),
            command_rx,
            self.close_timeout,
        ));
        Ok(())
    }

    /// Queues `payload` for delivery. Valid only while `Open`.
    ///
    /// Never blocks; payloads from one caller are written in call order.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), SessionError> {
        if self.state() != ConnectionState::Open {
            return Err(SessionError::NotConnected);
        }

        let commands = lock(&self.commands);
        let sender = commands.as_ref().ok_or(SessionError::NotConnected)?;
        sender
            .send(Command::Send(payload.into()))
            .map_err(|_| SessionError::NotConnected)
    }

    /// Starts tearing the session down.
    ///
    /// Has an effect only while `Connecting` or `Open`; every other call is a
    /// no-op, so repeated calls yield a single `Closed` event.
    pub fn close(&self) {
        let mut previous = ConnectionState::Idle;
        let closing = self.shared.state.send_if_modified(|state| {
            previous = *state;
            if state.can_close() {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
        if !closing {
            debug!(event = "session_close_ignored", state = %previous);
            return;
        }

        debug!(event = "session_closing", previous = %previous);
        if let Some(sender) = lock(&self.commands).as_ref() {
            let _ = sender.send(Command::Close);
        }
    }

    /// Waits until the state leaves `Connecting` and returns the new state.
    pub async fn wait_until_settled(&self) -> ConnectionState {
        let mut state_rx = self.shared.state.subscribe();
        let settled = match state_rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        settled
    }
}

impl<T: Transport> fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    observer: Mutex<Option<Observer>>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn lock_observer(&self) -> MutexGuard<'_, Option<Observer>> {
        lock(&self.observer)
    }

    /// `Connecting → Open`. Returns false when `close` got there first.
    fn open(&self) -> bool {
        let mut observer = self.lock_observer();
        let opened = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        if opened {
            emit(&mut observer, InboundEvent::Opened);
        }
        opened
    }

    /// Worker-side `Open → Closing`, used when the manager went away.
    fn begin_closing(&self) {
        self.state.send_if_modified(|state| {
            if state.can_close() {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
    }

    fn deliver(&self, payload: String) {
        let mut observer = self.lock_observer();
        let state = *self.state.borrow();
        if !state.delivers_messages() {
            debug!(event = "session_message_discarded", state = %state);
            return;
        }
        emit(&mut observer, InboundEvent::MessageReceived { payload });
    }

    fn finish(&self, terminal: ConnectionState, event: InboundEvent) {
        let mut observer = self.lock_observer();
        self.state.send_replace(terminal);
        emit(&mut observer, event);
    }

    /// Records a transport failure.
    ///
    /// Emits one `Error`, followed by `Closed` when the connection was live or
    /// a close had been requested.
    fn fail(&self, error: &TransportError, live: bool) {
        let description = error.to_string();
        let mut observer = self.lock_observer();
        // Recorded before the transition so waiters on the state see it.
        *lock(&self.last_error) = Some(description.clone());

        let mut previous = ConnectionState::Idle;
        let changed = self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    *state = ConnectionState::Failed;
                    true
                }
                ConnectionState::Closing => {
                    *state = ConnectionState::Closed;
                    true
                }
                _ => false,
            }
        });
        if !changed {
            return;
        }

        warn!(
            event = "session_transport_failed",
            previous = %previous,
            error = %description
        );
        emit(&mut observer, InboundEvent::Error { description });
        if live || previous == ConnectionState::Closing {
            emit(&mut observer, InboundEvent::closed(CLOSE_ABNORMAL, ""));
        }
    }
}

fn emit(observer: &mut Option<Observer>, event: InboundEvent) {
    debug!(event = "session_event", kind = event.kind());
    if let Some(observer) = observer.as_mut() {
        observer(event);
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn session_worker<T: Transport>(
    transport: Arc<T>,
    endpoint: Endpoint,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    close_timeout: Duration,
) {
    let handshake = transport.connect(&endpoint);
    tokio::pin!(handshake);

    let mut connection = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok(connection) => break connection,
                Err(err) => {
                    shared.fail(&err, false);
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(_)) => {
                    warn!(event = "session_payload_dropped", reason = "not_open");
                }
                Some(Command::Close) | None => {
                    info!(event = "session_closed", endpoint = %endpoint, during = "handshake");
                    shared.finish(
                        ConnectionState::Closed,
                        InboundEvent::closed(CLOSE_NORMAL, ""),
                    );
                    return;
                }
            },
        }
    };

    if !shared.open() {
        close_connection(&mut connection, &endpoint, &shared, close_timeout).await;
        return;
    }
    info!(event = "session_opened", endpoint = %endpoint);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    if let Err(err) = connection.send_text(payload).await {
                        discard_pending(&mut commands, "transport_failed");
                        shared.fail(&err, true);
                        return;
                    }
                }
                Some(Command::Close) => {
                    close_connection(&mut connection, &endpoint, &shared, close_timeout).await;
                    return;
                }
                None => {
                    shared.begin_closing();
                    close_connection(&mut connection, &endpoint, &shared, close_timeout).await;
                    return;
                }
            },
            frame = connection.recv() => match frame {
                Some(Ok(TransportFrame::Text(payload))) => shared.deliver(payload),
                Some(Ok(TransportFrame::Close { code, reason })) => {
                    discard_pending(&mut commands, "peer_closed");
                    // Acknowledge; the peer initiated the handshake.
                    let _ = connection.close(code, &reason).await;
                    info!(event = "session_closed", endpoint = %endpoint, code, initiator = "peer");
                    shared.finish(ConnectionState::Closed, InboundEvent::Closed { code, reason });
                    return;
                }
                Some(Err(err)) => {
                    discard_pending(&mut commands, "transport_failed");
                    shared.fail(&err, true);
                    return;
                }
                None => {
                    discard_pending(&mut commands, "transport_failed");
                    shared.fail(&TransportError::ConnectionReset, true);
                    return;
                }
            },
        }
    }
}

/// Drops payloads still queued behind a connection that is going away.
///
/// Returns the number of payloads dropped.
fn discard_pending(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    reason: &'static str,
) -> usize {
    let mut dropped = 0;
    while let Ok(command) = commands.try_recv() {
        if matches!(command, Command::Send(_)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!(event = "session_payload_dropped", reason, count = dropped);
    }
    dropped
}

/// Runs the client side of the closing handshake.
///
/// A peer that does not answer within `close_timeout` is abandoned and the
/// session ends with `CLOSE_ABNORMAL`.
async fn close_connection<C: TransportConnection>(
    connection: &mut C,
    endpoint: &Endpoint,
    shared: &Shared,
    close_timeout: Duration,
) {
    let handshake = async {
        if let Err(err) = connection.close(CLOSE_NORMAL, "").await {
            shared.fail(&err, true);
            return;
        }

        loop {
            match connection.recv().await {
                Some(Ok(TransportFrame::Text(payload))) => shared.deliver(payload),
                Some(Ok(TransportFrame::Close { code, reason })) => {
                    info!(event = "session_closed", endpoint = %endpoint, code, initiator = "client");
                    shared.finish(ConnectionState::Closed, InboundEvent::Closed { code, reason });
                    return;
                }
                Some(Err(err)) => {
                    shared.fail(&err, true);
                    return;
                }
                None => {
                    info!(event = "session_closed", endpoint = %endpoint, code = CLOSE_NORMAL, initiator = "client");
                    shared.finish(
                        ConnectionState::Closed,
                        InboundEvent::closed(CLOSE_NORMAL, ""),
                    );
                    return;
                }
            }
        }
    };

    if tokio::time::timeout(close_timeout, handshake).await.is_err() {
        warn!(
            event = "session_close_timed_out",
            endpoint = %endpoint,
            timeout_ms = close_timeout.as_millis() as u64
        );
        shared.finish(
            ConnectionState::Closed,
            InboundEvent::closed(CLOSE_ABNORMAL, ""),
        );
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{discard_pending, Command};

    #[test]
    fn discard_pending_counts_only_queued_payloads() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Command::Send("one".to_string())).expect("queue");
        tx.send(Command::Close).expect("queue");
        tx.send(Command::Send("two".to_string())).expect("queue");

        assert_eq!(discard_pending(&mut rx, "peer_closed"), 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(discard_pending(&mut rx, "peer_closed"), 0);
    }
}
