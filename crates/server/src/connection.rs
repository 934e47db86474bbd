//! One client connection: its socket pumps, keepalive and reply queue.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use slicevault_protocol::binary::parse_slice_frame;
use slicevault_protocol::constants::{
    MessageType, WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_NOT_IMPLEMENTED, WS_MAX_MESSAGE_SIZE,
    WS_PING_PERIOD, WS_PONG_WAIT,
};
use slicevault_protocol::envelope::Message;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;

/// Metadata about a connected client.
#[derive(Debug, Clone)]
pub struct PeerMeta {
    pub conn_id: String,
    pub remote_addr: String,
}

/// Handle for sending messages to one connected client.
///
/// Cloneable and cheap, wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Queues `msg` as a JSON text frame without waiting.
    ///
    /// Fails when the reply queue is full or the connection is gone.
    pub fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send queue full or closed, dropping reply");
            SendError
        })
    }

    /// Queues an error reply correlated with `req`.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message))
    }

    /// `false` once the write pump has stopped.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
pub(crate) fn test_sender(capacity: usize) -> (Sender, mpsc::Receiver<WsMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Sender { tx }, rx)
}

/// The reply could not be queued.
#[derive(Debug, thiserror::Error)]
#[error("reply dropped: send queue full or connection closed")]
pub struct SendError;

/// Active connection to a client.
///
/// Dropping it does not stop the pumps; use [`close`](Self::close) or
/// cancel the server token.
pub struct Connection {
    pub meta: PeerMeta,
    sender: Sender,
    cancel: CancellationToken,
    done: tokio::sync::watch::Receiver<bool>,
}

impl Connection {
    /// Reply handle for this connection.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Returns `true` until the read pump has exited.
    pub fn is_alive(&self) -> bool {
        !*self.done.borrow()
    }

    /// Signals shutdown without waiting.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Signals shutdown and waits until the disconnect hook has run.
    pub async fn close_and_wait(mut self) {
        self.cancel.cancel();
        let _ = self.done.wait_for(|done| *done).await;
    }
}

/// Starts the pumps for an upgraded socket and returns its handle.
///
/// Both pumps run as background tasks until the peer leaves, goes silent
/// past [`WS_PONG_WAIT`], or `server_cancel` fires.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    meta: PeerMeta,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> Connection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let (done_tx, done_rx) = tokio::sync::watch::channel(false);
    let cancel = server_cancel.child_token();
    let sender = Sender { tx };

    let conn = Connection {
        meta: meta.clone(),
        sender: sender.clone(),
        cancel: cancel.clone(),
        done: done_rx,
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    // Write pump.
    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    // Read pump.
    let read_cancel = cancel.clone();
    tokio::spawn(async move {
        handler.on_connected(&meta).await;
        read_pump(ws_stream, sender, handler.clone(), read_cancel.clone()).await;
        // The write pump follows the read pump down.
        read_cancel.cancel();
        handler.on_disconnected(&meta).await;
        tracing::info!(conn = %meta.conn_id, peer = %meta.remote_addr, "client disconnected");
        let _ = done_tx.send(true);
    });

    conn
}

/// Sole writer of the socket: forwards queued replies and pings every
/// [`WS_PING_PERIOD`].
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("socket write failed: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("ping write failed: {e}");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches them to the handler in arrival
/// order.
///
/// Any inbound frame counts as liveness; the connection is dropped when
/// nothing arrives for [`WS_PONG_WAIT`].
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,

            frame = tokio::time::timeout(WS_PONG_WAIT, stream.next()) => frame,
        };

        let ws_msg = match frame {
            Err(_) => {
                tracing::warn!("read deadline exceeded, closing connection");
                break;
            }
            Ok(Some(Ok(ws_msg))) => ws_msg,
            Ok(Some(Err(e))) => {
                tracing::error!("socket read failed: {e}");
                break;
            }
            Ok(None) => break, // Stream ended.
        };

        match ws_msg {
            WsMessage::Text(text) => {
                if text.len() > WS_MAX_MESSAGE_SIZE {
                    tracing::error!(
                        "message exceeds max size ({} > {})",
                        text.len(),
                        WS_MAX_MESSAGE_SIZE
                    );
                    continue;
                }
                dispatch_text(&handler, &sender, &text).await;
            }
            WsMessage::Binary(data) => {
                if data.len() > WS_MAX_MESSAGE_SIZE {
                    tracing::error!(
                        "binary message exceeds max size ({} > {})",
                        data.len(),
                        WS_MAX_MESSAGE_SIZE
                    );
                    continue;
                }
                dispatch_binary(&handler, &sender, &data).await;
            }
            WsMessage::Ping(data) => {
                let _ = sender.tx.try_send(WsMessage::Pong(data));
            }
            WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                tracing::debug!("peer sent close frame");
                break;
            }
            WsMessage::Frame(_) => {}
        }
    }
}

/// Decodes a JSON envelope and routes it by message type.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("dropping undecodable envelope: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::Ping => handler.on_ping(s, msg).await,
        MessageType::CheckExists => handler.on_check_exists(s, msg).await,
        MessageType::BeginTransfer => handler.on_begin_transfer(s, msg).await,
        MessageType::QueryResendList => handler.on_query_resend_list(s, msg).await,
        MessageType::AcceptSlice => handler.on_accept_slice(s, msg).await,
        MessageType::FinalizeTransfer => handler.on_finalize_transfer(s, msg).await,
        MessageType::GetMetadata => handler.on_get_metadata(s, msg).await,
        MessageType::GetFileInfo => handler.on_get_file_info(s, msg).await,
        MessageType::ListFiles => handler.on_list_files(s, msg).await,
        MessageType::UploadFile => handler.on_upload_file(s, msg).await,
        MessageType::DownloadFile => handler.on_download_file(s, msg).await,
        MessageType::DownloadSlice => handler.on_download_slice(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, id = %msg.id, "no route for message type");
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "unknown message type");
        }
    }
}

/// Dispatches a binary slice frame to the handler.
///
/// A frame whose header cannot be read has no id to reply to, so it is
/// logged and dropped. Frames with a readable id but a bad header get an
/// error reply.
async fn dispatch_binary<H: Handler>(handler: &Arc<H>, sender: &Sender, data: &[u8]) {
    match parse_slice_frame(data) {
        Ok((header, payload)) => {
            handler.on_binary_slice(sender.clone(), header, payload).await;
        }
        Err(e) => {
            tracing::error!("bad slice frame: {e}");
            if let Some(id) = peek_frame_id(data) {
                let _ = sender.send_msg(Message::error(
                    id,
                    WS_ERR_CODE_BAD_REQUEST,
                    format!("invalid slice frame: {e}"),
                ));
            }
        }
    }
}

fn peek_frame_id(data: &[u8]) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct IdOnly {
        id: String,
    }

    let len = u32::from_be_bytes(data.get(..4)?.try_into().ok()?) as usize;
    let header = data.get(4..4usize.checked_add(len)?)?;
    serde_json::from_slice::<IdOnly>(header).ok().map(|h| h.id)
}
