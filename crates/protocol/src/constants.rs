use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for a pong response (or any incoming message).
///
/// Acts as a read deadline on both ends: if nothing arrives within this
/// window the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Maximum message size in bytes (64 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Largest file a single `file_data` reply can carry: its base64 body plus
/// 64 KiB of envelope must fit in one message. Bigger files go by slice.
pub const WS_MAX_WHOLE_FILE_SIZE: usize = (WS_MAX_MESSAGE_SIZE - 64 * 1024) / 4 * 3;

/// Timeout for request/response operations (text messages).
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for binary slice uploads.
///
/// Slice writes hit the disk before the reply is sent, so they get a
/// longer window than plain text requests.
pub const WS_BINARY_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sentinel in a resend list: the preceding index and every index after it
/// up to `slice_count - 1` are missing.
pub const RESEND_TAIL: i64 = -1;

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Requests from client to server
    Ping,
    CheckExists,
    BeginTransfer,
    QueryResendList,
    AcceptSlice,
    FinalizeTransfer,
    GetMetadata,
    GetFileInfo,
    ListFiles,
    UploadFile,
    DownloadFile,
    DownloadSlice,

    // Responses from server to client
    Pong,
    ExistsResponse,
    TransferBegun,
    ResendList,
    SliceAccepted,
    TransferFinalized,
    MetadataResponse,
    FileInfoResponse,
    FileListResponse,
    FileUploaded,
    FileData,
    SliceData,
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Malformed request, invalid name, or a fid that does not own the record.
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
/// Metadata record, staging area, slice, or file does not exist.
pub const WS_ERR_CODE_NOT_FOUND: i32 = 404;
/// The filename is already claimed, or the fid is already staged.
pub const WS_ERR_CODE_CONFLICT: i32 = 409;
/// Finalize was requested before every slice arrived.
pub const WS_ERR_CODE_MISSING_SLICE: i32 = 412;
/// A whole-file reply would not fit in one WebSocket message.
pub const WS_ERR_CODE_TOO_LARGE: i32 = 413;
/// Checksum mismatch at finalize.
pub const WS_ERR_CODE_INTEGRITY: i32 = 422;
/// Corrupt metadata or an I/O failure on the server.
pub const WS_ERR_CODE_INTERNAL: i32 = 500;
/// The server does not understand the message type.
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_file_reply_fits_one_message() {
        let encoded = WS_MAX_WHOLE_FILE_SIZE.div_ceil(3) * 4;
        assert!(encoded + 64 * 1024 <= WS_MAX_MESSAGE_SIZE);
        assert!(WS_MAX_WHOLE_FILE_SIZE > 47 * 1024 * 1024);
    }

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::BeginTransfer).unwrap(),
            "\"begin_transfer\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::QueryResendList).unwrap(),
            "\"query_resend_list\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::FileInfoResponse).unwrap(),
            "\"file_info_response\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"finalize_transfer\"").unwrap();
        assert_eq!(mt, MessageType::FinalizeTransfer);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"launch_rockets\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }
}
