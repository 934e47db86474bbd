//! WebSocket server for SliceVault.
//!
//! Accepts any number of client connections over WebSocket, dispatches
//! JSON and binary messages to a [`Handler`] trait, and manages each
//! connection's lifecycle (ping/pong, idle timeout, graceful shutdown).
//! [`TransferService`] is the handler that binds every request to the
//! transfer engine and the file catalog.

mod connection;
mod handler;
mod server;
mod service;

pub use connection::{Connection, PeerMeta, SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::{FileServer, ServerConfig};
pub use service::TransferService;

/// Send buffer capacity per connection.
///
/// Requests on a connection are handled one at a time, so this only has to
/// absorb replies queued behind a slow socket.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid listen address {0}")]
    InvalidAddress(String),
}
