//! WebSocket client for SliceVault servers.
//!
//! Implements the request-response pattern with UUID correlation and
//! ping/pong keepalive, plus a typed method for every server operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use slicevault_protocol::binary::encode_frame;
use slicevault_protocol::constants::{
    MessageType, WS_BINARY_REQUEST_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_REQUEST_TIMEOUT,
};
use slicevault_protocol::envelope::Message;
use slicevault_protocol::messages::{
    AcceptSliceRequest, DownloadSliceRequest, ExistsResponse, FileDataResponse, FileListResponse,
    FileUploadedResponse, FilenameRequest, ResendListResponse, SliceAcceptedResponse,
    SliceDataResponse, SliceFrameHeader, TransferBegunResponse, TransferFinalizedResponse,
    TransferRef, UploadFileRequest,
};
use slicevault_protocol::{FileInfo, FileMetadata};

use crate::ClientError;

/// Requests waiting for their reply, keyed by message id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// WebSocket client connected to a single server.
pub struct Client {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl Client {
    /// Connects to a server at `url` (e.g. `ws://127.0.0.1:8080`).
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(read, pending, write_tx, cancel))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        tracing::debug!(url, "connected");

        Ok(Self {
            write_tx,
            pending,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        })
    }

    /// Sends a request and waits for the response.
    ///
    /// An error reply is returned as [`ClientError::Server`].
    pub async fn request<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Message, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let json = serde_json::to_string(&msg)?;

        self.exchange(id, tungstenite::Message::Text(json.into()), WS_REQUEST_TIMEOUT)
            .await
    }

    /// Sends one slice as a binary frame and waits for the `slice_accepted`
    /// reply.
    ///
    /// A fresh id is generated for the frame header.
    pub async fn send_slice(
        &self,
        fid: &str,
        index: u32,
        data: &[u8],
    ) -> Result<SliceAcceptedResponse, ClientError> {
        let header = SliceFrameHeader {
            id: uuid::Uuid::new_v4().to_string(),
            fid: fid.to_owned(),
            index,
        };
        let frame = encode_frame(&header, data)?;

        let reply = self
            .exchange(
                header.id,
                tungstenite::Message::Binary(frame.into()),
                WS_BINARY_REQUEST_TIMEOUT,
            )
            .await?;
        expect_payload(reply, MessageType::SliceAccepted)
    }

    /// Registers `id` as pending, sends `frame`, and waits for the reply.
    async fn exchange(
        &self,
        id: String,
        frame: tungstenite::Message,
        timeout: Duration,
    ) -> Result<Message, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.write_tx.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::Closed);
        }

        let result = tokio::time::timeout(timeout, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(ClientError::Server {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
        reply_type: MessageType,
    ) -> Result<R, ClientError> {
        let reply = self.request(msg_type, payload).await?;
        expect_payload(reply, reply_type)
    }

    /// Round-trips a `ping`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let reply = self.request::<()>(MessageType::Ping, None).await?;
        expect_type(&reply, MessageType::Pong)
    }

    /// Returns whether a record exists for `filename`.
    pub async fn check_exists(&self, fid: &str, filename: &str) -> Result<bool, ClientError> {
        let req = TransferRef {
            fid: fid.to_owned(),
            filename: filename.to_owned(),
        };
        let resp: ExistsResponse = self
            .call(MessageType::CheckExists, Some(&req), MessageType::ExistsResponse)
            .await?;
        Ok(resp.exists)
    }

    pub async fn begin_transfer(
        &self,
        metadata: &FileMetadata,
    ) -> Result<TransferBegunResponse, ClientError> {
        self.call(MessageType::BeginTransfer, Some(metadata), MessageType::TransferBegun)
            .await
    }

    /// Returns the compacted resend list; see
    /// [`expand_resend_list`](slicevault_transfer::expand_resend_list).
    pub async fn query_resend_list(
        &self,
        fid: &str,
        filename: &str,
    ) -> Result<Vec<i64>, ClientError> {
        let req = TransferRef {
            fid: fid.to_owned(),
            filename: filename.to_owned(),
        };
        let resp: ResendListResponse = self
            .call(MessageType::QueryResendList, Some(&req), MessageType::ResendList)
            .await?;
        Ok(resp.slices)
    }

    /// Sends one slice inside a JSON message (base64 payload).
    pub async fn accept_slice(
        &self,
        fid: &str,
        index: u32,
        data: &[u8],
    ) -> Result<SliceAcceptedResponse, ClientError> {
        let req = AcceptSliceRequest {
            fid: fid.to_owned(),
            index,
            data: data.to_vec(),
        };
        self.call(MessageType::AcceptSlice, Some(&req), MessageType::SliceAccepted)
            .await
    }

    /// Finalizes a transfer and returns the checksum the server computed.
    pub async fn finalize_transfer(&self, metadata: &FileMetadata) -> Result<String, ClientError> {
        let resp: TransferFinalizedResponse = self
            .call(
                MessageType::FinalizeTransfer,
                Some(metadata),
                MessageType::TransferFinalized,
            )
            .await?;
        Ok(resp.checksum)
    }

    pub async fn get_metadata(&self, filename: &str) -> Result<FileMetadata, ClientError> {
        let req = FilenameRequest {
            filename: filename.to_owned(),
        };
        self.call(MessageType::GetMetadata, Some(&req), MessageType::MetadataResponse)
            .await
    }

    pub async fn get_file_info(&self, filename: &str) -> Result<FileInfo, ClientError> {
        let req = FilenameRequest {
            filename: filename.to_owned(),
        };
        self.call(MessageType::GetFileInfo, Some(&req), MessageType::FileInfoResponse)
            .await
    }

    pub async fn list_files(&self) -> Result<Vec<FileInfo>, ClientError> {
        let resp: FileListResponse = self
            .call::<(), _>(MessageType::ListFiles, None, MessageType::FileListResponse)
            .await?;
        Ok(resp.files)
    }

    /// Stores `data` as a plain file in one message; returns the stored size.
    pub async fn upload_file(&self, filename: &str, data: &[u8]) -> Result<u64, ClientError> {
        let req = UploadFileRequest {
            filename: filename.to_owned(),
            data: data.to_vec(),
        };
        let resp: FileUploadedResponse = self
            .call(MessageType::UploadFile, Some(&req), MessageType::FileUploaded)
            .await?;
        Ok(resp.size)
    }

    pub async fn download_file(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
        let req = FilenameRequest {
            filename: filename.to_owned(),
        };
        let resp: FileDataResponse = self
            .call(MessageType::DownloadFile, Some(&req), MessageType::FileData)
            .await?;
        Ok(resp.data)
    }

    pub async fn download_slice(&self, filename: &str, index: u32) -> Result<Vec<u8>, ClientError> {
        let req = DownloadSliceRequest {
            filename: filename.to_owned(),
            index,
        };
        let resp: SliceDataResponse = self
            .call(MessageType::DownloadSlice, Some(&req), MessageType::SliceData)
            .await?;
        Ok(resp.data)
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
        self.cancel.cancel();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

fn expect_type(reply: &Message, expected: MessageType) -> Result<(), ClientError> {
    if reply.msg_type == expected {
        Ok(())
    } else {
        Err(ClientError::UnexpectedReply(format!(
            "expected {expected:?}, got {:?}",
            reply.msg_type
        )))
    }
}

fn expect_payload<R: DeserializeOwned>(
    reply: Message,
    expected: MessageType,
) -> Result<R, ClientError> {
    expect_type(&reply, expected)?;
    Ok(reply.require_payload()?)
}
