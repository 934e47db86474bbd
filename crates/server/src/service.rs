//! Request handler binding the wire protocol to the transfer engine and the
//! file catalog.

use std::fmt::Display;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use slicevault_file_ops::FileOpsError;
use slicevault_protocol::constants::{
    MessageType, WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_INTERNAL,
};
use slicevault_protocol::envelope::Message;
use slicevault_protocol::messages::{
    AcceptSliceRequest, DownloadSliceRequest, ExistsResponse, FileDataResponse, FileListResponse,
    FileUploadedResponse, FilenameRequest, ResendListResponse, SliceAcceptedResponse,
    SliceDataResponse, SliceFrameHeader, TransferBegunResponse, TransferFinalizedResponse,
    TransferRef, UploadFileRequest,
};
use slicevault_protocol::FileMetadata;
use slicevault_transfer::{TransferCoordinator, TransferError};

use crate::connection::Sender;
use crate::handler::{Handler, HandlerFuture};

/// Errors that carry a wire code.
trait WireError: Display {
    fn wire_code(&self) -> i32;
}

impl WireError for TransferError {
    fn wire_code(&self) -> i32 {
        self.code()
    }
}

impl WireError for FileOpsError {
    fn wire_code(&self) -> i32 {
        self.code()
    }
}

/// Serves every transfer and file operation against one storage root.
#[derive(Debug, Clone)]
pub struct TransferService {
    coordinator: TransferCoordinator,
}

impl TransferService {
    pub fn new(coordinator: TransferCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }

    fn root(&self) -> &Path {
        &self.coordinator.settings().store_dir
    }
}

/// Decodes the request payload, replying 400 when it is missing or malformed.
fn parse<T: DeserializeOwned>(sender: &Sender, msg: &Message) -> Option<T> {
    match msg.require_payload() {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(msg_type = ?msg.msg_type, "bad payload: {e}");
            let _ = sender.send_error(msg, WS_ERR_CODE_BAD_REQUEST, &format!("bad payload: {e}"));
            None
        }
    }
}

/// Sends the typed reply for request `id` on success, or an error reply
/// carrying the error's code.
fn respond<T: Serialize, E: WireError>(
    sender: &Sender,
    id: &str,
    reply_type: MessageType,
    result: Result<T, E>,
) {
    let reply = match result {
        Ok(payload) => Message::new(id, reply_type, Some(&payload)).unwrap_or_else(|e| {
            Message::error(id, WS_ERR_CODE_INTERNAL, format!("encode reply: {e}"))
        }),
        Err(e) => {
            let code = e.wire_code();
            if code >= WS_ERR_CODE_INTERNAL {
                tracing::error!(id, reply = ?reply_type, code, "request failed: {e}");
            } else {
                tracing::debug!(id, reply = ?reply_type, code, "request rejected: {e}");
            }
            Message::error(id, code, e.to_string())
        }
    };
    let _ = sender.send_msg(reply);
}

impl Handler for TransferService {
    fn on_check_exists(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<TransferRef>(&sender, &msg) else {
                return;
            };
            let result = self
                .coordinator
                .check_exists(&req.fid, &req.filename)
                .await
                .map(|exists| ExistsResponse { exists });
            respond(&sender, &msg.id, MessageType::ExistsResponse, result);
        })
    }

    fn on_begin_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(meta) = parse::<FileMetadata>(&sender, &msg) else {
                return;
            };
            let result = self.coordinator.begin(&meta).await.map(|()| TransferBegunResponse {
                fid: meta.fid.clone(),
                filename: meta.filename.clone(),
            });
            respond(&sender, &msg.id, MessageType::TransferBegun, result);
        })
    }

    fn on_query_resend_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<TransferRef>(&sender, &msg) else {
                return;
            };
            let result = self
                .coordinator
                .query_resend_list(&req.fid, &req.filename)
                .await
                .map(|slices| ResendListResponse { slices });
            respond(&sender, &msg.id, MessageType::ResendList, result);
        })
    }

    fn on_accept_slice(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<AcceptSliceRequest>(&sender, &msg) else {
                return;
            };
            let result = self
                .coordinator
                .accept_slice(&req.fid, req.index, &req.data)
                .await
                .map(|stored| SliceAcceptedResponse {
                    fid: req.fid.clone(),
                    index: req.index,
                    stored,
                });
            respond(&sender, &msg.id, MessageType::SliceAccepted, result);
        })
    }

    fn on_binary_slice(
        &self,
        sender: Sender,
        header: SliceFrameHeader,
        data: Vec<u8>,
    ) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = self
                .coordinator
                .accept_slice(&header.fid, header.index, &data)
                .await
                .map(|stored| SliceAcceptedResponse {
                    fid: header.fid.clone(),
                    index: header.index,
                    stored,
                });
            // Binary frames carry their correlation id in the header.
            respond(&sender, &header.id, MessageType::SliceAccepted, result);
        })
    }

    fn on_finalize_transfer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(meta) = parse::<FileMetadata>(&sender, &msg) else {
                return;
            };
            let result = self
                .coordinator
                .finalize(&meta)
                .await
                .map(|checksum| TransferFinalizedResponse {
                    filename: meta.filename.clone(),
                    checksum,
                });
            respond(&sender, &msg.id, MessageType::TransferFinalized, result);
        })
    }

    fn on_get_metadata(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<FilenameRequest>(&sender, &msg) else {
                return;
            };
            let result = self
                .coordinator
                .get_metadata(&req.filename)
                .await
                .map(|record| record.metadata);
            respond(&sender, &msg.id, MessageType::MetadataResponse, result);
        })
    }

    fn on_get_file_info(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<FilenameRequest>(&sender, &msg) else {
                return;
            };
            let result = slicevault_file_ops::file_info(self.root(), &req.filename).await;
            respond(&sender, &msg.id, MessageType::FileInfoResponse, result);
        })
    }

    fn on_list_files(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = slicevault_file_ops::list_files(self.root())
                .await
                .map(|files| FileListResponse { files });
            respond(&sender, &msg.id, MessageType::FileListResponse, result);
        })
    }

    fn on_upload_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<UploadFileRequest>(&sender, &msg) else {
                return;
            };
            let result = slicevault_file_ops::upload_whole(self.root(), &req.filename, &req.data)
                .await
                .map(|size| FileUploadedResponse {
                    filename: req.filename.clone(),
                    size,
                });
            respond(&sender, &msg.id, MessageType::FileUploaded, result);
        })
    }

    fn on_download_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<FilenameRequest>(&sender, &msg) else {
                return;
            };
            let result = slicevault_file_ops::download_whole(self.root(), &req.filename)
                .await
                .map(|data| FileDataResponse {
                    filename: req.filename.clone(),
                    data,
                });
            respond(&sender, &msg.id, MessageType::FileData, result);
        })
    }

    fn on_download_slice(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse::<DownloadSliceRequest>(&sender, &msg) else {
                return;
            };
            let result = slicevault_file_ops::download_slice(self.root(), &req.filename, req.index)
                .await
                .map(|data| SliceDataResponse {
                    filename: req.filename.clone(),
                    index: req.index,
                    data,
                });
            respond(&sender, &msg.id, MessageType::SliceData, result);
        })
    }
}
