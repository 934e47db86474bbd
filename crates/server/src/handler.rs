//! Handler trait for processing WebSocket messages.
//!
//! Implementors provide the domain logic while the server framework
//! handles connection management, routing, and the binary frame format.

use std::future::Future;
use std::pin::Pin;

use slicevault_protocol::constants::{MessageType, WS_ERR_CODE_NOT_IMPLEMENTED};
use slicevault_protocol::envelope::Message;
use slicevault_protocol::messages::SliceFrameHeader;

use crate::connection::{PeerMeta, Sender};

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

fn not_implemented(sender: Sender, msg: Message) -> HandlerFuture<'static> {
    Box::pin(async move {
        let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
    })
}

/// Trait for handling WebSocket messages from a client.
///
/// The server dispatches parsed messages to the appropriate method. Each
/// method receives:
/// - `sender`: channel to send the reply back to the client
/// - `msg`: the parsed JSON envelope (for text) or binary frame
///
/// Every request must be answered with exactly one reply carrying its id.
/// Default implementations reply with "not implemented" so handlers only
/// need to override the message types they care about.
pub trait Handler: Send + Sync + 'static {
    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(MessageType::Pong, Option::<&()>::None) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    /// Called for `check_exists`.
    fn on_check_exists(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `begin_transfer`.
    fn on_begin_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `query_resend_list`.
    fn on_query_resend_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `accept_slice` (JSON form; binary frames use `on_binary_slice`).
    fn on_accept_slice(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `finalize_transfer`.
    fn on_finalize_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `get_metadata`.
    fn on_get_metadata(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `get_file_info`.
    fn on_get_file_info(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `list_files`.
    fn on_list_files(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `upload_file`.
    fn on_upload_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `download_file`.
    fn on_download_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `download_slice`.
    fn on_download_slice(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for a binary slice frame.
    fn on_binary_slice(
        &self,
        sender: Sender,
        header: SliceFrameHeader,
        data: Vec<u8>,
    ) -> HandlerFuture<'_> {
        let _ = data;
        Box::pin(async move {
            tracing::warn!("binary slice received but handler not implemented");
            let _ = sender.send_msg(Message::error(
                header.id,
                WS_ERR_CODE_NOT_IMPLEMENTED,
                "not implemented",
            ));
        })
    }

    /// Called once the WebSocket handshake has completed.
    fn on_connected<'a>(&'a self, peer: &'a PeerMeta) -> HandlerFuture<'a> {
        Box::pin(async move {
            tracing::info!(conn = %peer.conn_id, peer = %peer.remote_addr, "client connected");
        })
    }

    /// Called when the client disconnects (cleanup hook).
    fn on_disconnected<'a>(&'a self, peer: &'a PeerMeta) -> HandlerFuture<'a> {
        let _ = peer;
        Box::pin(async {})
    }
}
