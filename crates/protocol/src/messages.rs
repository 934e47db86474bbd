use serde::{Deserialize, Serialize};

use crate::types::FileInfo;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Identifies one transfer: the fid that owns it and the target filename.
///
/// Used by `check_exists` and `query_resend_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRef {
    pub fid: String,
    pub filename: String,
}

/// Sends one slice as JSON (the binary frame path is preferred).
///
/// `data` is base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptSliceRequest {
    pub fid: String,
    pub index: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Any request addressed by filename alone
/// (`get_metadata`, `get_file_info`, `download_file`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameRequest {
    pub filename: String,
}

/// Uploads a whole file in a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileRequest {
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Requests one stored slice of a slice-tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSliceRequest {
    pub filename: String,
    pub index: u32,
}

/// Header of a binary slice frame.
///
/// Wire format: `[4 bytes: header_len (big-endian)][header_len bytes: JSON header][rest: slice bytes]`.
/// `id` correlates the `slice_accepted` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceFrameHeader {
    pub id: String,
    pub fid: String,
    pub index: u32,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Reply to `check_exists`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Reply to `begin_transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBegunResponse {
    pub fid: String,
    pub filename: String,
}

/// Reply to `query_resend_list`.
///
/// A trailing [`RESEND_TAIL`](crate::RESEND_TAIL) means the entry before it
/// and everything up to the last slice is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendListResponse {
    pub slices: Vec<i64>,
}

/// Reply to `accept_slice` and to binary slice frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceAcceptedResponse {
    pub fid: String,
    pub index: u32,
    /// `false` when the slice was already present and the write was skipped.
    pub stored: bool,
}

/// Reply to `finalize_transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFinalizedResponse {
    pub filename: String,
    /// Checksum recomputed by the server over the ordered slices.
    pub checksum: String,
}

/// Reply to `list_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
}

/// Reply to `upload_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadedResponse {
    pub filename: String,
    pub size: u64,
}

/// Reply to `download_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDataResponse {
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Reply to `download_slice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDataResponse {
    pub filename: String,
    pub index: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Byte payloads travel as standard base64 strings inside JSON.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    #[test]
    fn accept_slice_data_is_base64() {
        let req = AcceptSliceRequest {
            fid: "f1".into(),
            index: 2,
            data: b"Hello".to_vec(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("SGVsbG8="));
        let parsed: AcceptSliceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data, b"Hello");
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let json = r#"{"fid":"f1","index":0,"data":"***"}"#;
        assert!(serde_json::from_str::<AcceptSliceRequest>(json).is_err());
    }

    #[test]
    fn resend_list_keeps_sentinel() {
        let resp = ResendListResponse {
            slices: vec![3, crate::RESEND_TAIL],
        };
        assert_eq!(serde_json::to_string(&resp).unwrap(), r#"{"slices":[3,-1]}"#);
    }

    #[test]
    fn negative_slice_index_is_rejected() {
        let json = r#"{"filename":"a","index":-1}"#;
        assert!(serde_json::from_str::<DownloadSliceRequest>(json).is_err());
    }

    #[test]
    fn file_list_shape() {
        let resp = FileListResponse {
            files: vec![FileInfo {
                filename: "notes.txt".into(),
                filesize: 12,
                filetype: FileKind::Normal,
            }],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["files"][0]["filetype"], "normal");
        assert_eq!(json["files"][0]["filesize"], 12);
    }
}
