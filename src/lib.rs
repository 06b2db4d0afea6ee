//! Owned WebSocket client session with an ordered lifecycle event stream.
//!
//! The crate is organized around one component:
//! - `session`: `SessionManager`, which owns one logical connection, exposes
//!   connect/send/close, and delivers `InboundEvent`s to a single observer in
//!   arrival order.
//! - `transport`: the text-socket boundary the manager wraps, with websocket,
//!   TLS and in-memory implementations.
//! - `retry`: caller-side reconnect with backoff, and deadline helpers.
//! - `config`: TOML client configuration.
//! - `console`: display formatting for terminal clients.

/// TOML client configuration.
pub mod config;
/// Terminal line formatting.
pub mod console;
/// Reconnect and timeout helpers.
pub mod retry;
/// Session manager, endpoint, states and events.
pub mod session;
/// Transport trait and implementations.
pub mod transport;

pub use session::{ConnectionState, Endpoint, InboundEvent, SessionError, SessionManager};
