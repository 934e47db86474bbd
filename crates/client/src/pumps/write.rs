//! WebSocket write pump: the only task that touches the socket sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Forwards queued frames to the socket in order.
///
/// Stops when cancelled, when every sender is gone, or after a client-sent
/// close frame; always finishes with a close frame of its own if none was
/// queued.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut sent = 0u64;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = write_rx.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        let closing = frame.is_close();
        if let Err(e) = write.send(frame).await {
            error!("WebSocket write error: {e}");
            return;
        }
        sent += 1;
        if closing {
            debug!(sent, "close frame sent");
            return;
        }
    }

    debug!(sent, "write pump stopping");
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
