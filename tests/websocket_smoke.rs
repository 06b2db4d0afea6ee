use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::timeout;
use ws_session::{ConnectionState, InboundEvent, SessionManager};

const GREETING: &str = "Welcome! Please login or Register.";
const QUIT_COMMAND: &str = "quit";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_session_greets_echoes_and_observes_server_close() {
    let (addr, shutdown_tx, server_task) = spawn_server(echo_router()).await;

    let manager = SessionManager::websocket();
    let mut events = manager.event_stream();
    manager
        .connect(&format!("ws://{addr}/ws"))
        .expect("connect to mock ws server");

    assert_eq!(next_event(&mut events).await, InboundEvent::Opened);
    assert_eq!(next_event(&mut events).await, InboundEvent::message(GREETING));

    manager.send("login alice").expect("send while open");
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::message("Echo: login alice")
    );

    manager.send(QUIT_COMMAND).expect("send quit");
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::closed(1000, "")
    );
    assert_eq!(manager.state(), ConnectionState::Closed);

    let _ = shutdown_tx.send(());
    server_task.await.expect("mock ws server task should join");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_session_client_close_completes_handshake() {
    let (addr, shutdown_tx, server_task) = spawn_server(echo_router()).await;

    let manager = SessionManager::websocket();
    let mut events = manager.event_stream();
    manager
        .connect(&format!("ws://{addr}/ws"))
        .expect("connect to mock ws server");
    assert_eq!(next_event(&mut events).await, InboundEvent::Opened);
    assert_eq!(next_event(&mut events).await, InboundEvent::message(GREETING));

    manager.close();
    manager.close();
    match next_event(&mut events).await {
        InboundEvent::Closed { code, .. } => assert_eq!(code, 1000),
        other => panic!("expected closed event, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(timeout(Duration::from_millis(100), events.recv()).await.is_err());

    let _ = shutdown_tx.send(());
    server_task.await.expect("mock ws server task should join");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_session_unreachable_endpoint_fails() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let addr = listener.local_addr().expect("throwaway listener address");
    drop(listener);

    let manager = SessionManager::websocket();
    let mut events = manager.event_stream();
    manager
        .connect(&format!("ws://{addr}/ws"))
        .expect("connect is accepted");

    assert_eq!(manager.wait_until_settled().await, ConnectionState::Failed);
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Error { .. }
    ));
    assert!(timeout(Duration::from_millis(100), events.recv()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_session_reports_status_less_close_as_1005() {
    let (addr, shutdown_tx, server_task) = spawn_server(misbehaving_router()).await;

    let manager = SessionManager::websocket();
    let mut events = manager.event_stream();
    manager
        .connect(&format!("ws://{addr}/close-without-status"))
        .expect("connect to mock ws server");

    assert_eq!(next_event(&mut events).await, InboundEvent::Opened);
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::closed(1005, "")
    );
    assert_eq!(manager.state(), ConnectionState::Closed);

    let _ = shutdown_tx.send(());
    server_task.await.expect("mock ws server task should join");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_session_fails_on_binary_frame() {
    let (addr, shutdown_tx, server_task) = spawn_server(misbehaving_router()).await;

    let manager = SessionManager::websocket();
    let mut events = manager.event_stream();
    manager
        .connect(&format!("ws://{addr}/binary"))
        .expect("connect to mock ws server");

    assert_eq!(next_event(&mut events).await, InboundEvent::Opened);
    match next_event(&mut events).await {
        InboundEvent::Error { description } => {
            assert!(description.contains("binary"), "{description}");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::closed(1006, "")
    );
    assert_eq!(manager.state(), ConnectionState::Failed);

    let _ = shutdown_tx.send(());
    server_task.await.expect("mock ws server task should join");
}

async fn next_event(events: &mut UnboundedReceiver<InboundEvent>) -> InboundEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event stream closed")
}

fn echo_router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(run_echo_protocol)
}

fn misbehaving_router() -> Router {
    Router::new()
        .route(
            "/close-without-status",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(close_without_status) }),
        )
        .route(
            "/binary",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(send_binary) }),
        )
}

async fn close_without_status(mut socket: WebSocket) {
    if socket.send(Message::Close(None)).await.is_err() {
        return;
    }
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn send_binary(mut socket: WebSocket) {
    if socket
        .send(Message::Binary(vec![0xde, 0xad].into()))
        .await
        .is_err()
    {
        return;
    }
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn run_echo_protocol(mut socket: WebSocket) {
    if socket.send(Message::Text(GREETING.into())).await.is_err() {
        return;
    }

    // Keep reading after a close frame so the reply gets flushed.
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) if text.as_str() == QUIT_COMMAND => {
                let frame = CloseFrame {
                    code: 1000,
                    reason: "".into(),
                };
                if socket.send(Message::Close(Some(frame))).await.is_err() {
                    return;
                }
            }
            Message::Text(text) => {
                let reply = format!("Echo: {}", text.as_str());
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    return;
                }
            }
            _ => {}
        }
    }
}

async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server listener");
    let addr = listener
        .local_addr()
        .expect("read mock server listener address");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("mock server should run");
    });
    (addr, shutdown_tx, task)
}
