use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata the client declares for a sliced transfer.
///
/// `checksum` is the lowercase hex MD5 of the whole file. It is empty in a
/// record that has not been finalized yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Client-generated identifier of this transfer attempt.
    pub fid: String,
    /// Declared total size in bytes.
    pub filesize: i64,
    /// Logical file name, also the storage key.
    pub filename: String,
    /// Declared number of slices.
    pub slice_count: u32,
    #[serde(default)]
    pub checksum: String,
    /// Client-declared modification time.
    pub modify_time: DateTime<Utc>,
}

/// Lifecycle state of a slice-tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Uploading,
    /// Reserved; no code path assigns it.
    Downloading,
    Active,
}

/// How a stored file is kept on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Stored as a single plain file.
    Normal,
    /// Stored as slices tracked by a sidecar record.
    Slice,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub filesize: i64,
    pub filetype: FileKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> FileMetadata {
        FileMetadata {
            fid: "6f1c2d3e".into(),
            filesize: 10,
            filename: "report.pdf".into(),
            slice_count: 3,
            checksum: String::new(),
            modify_time: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn metadata_uses_camel_case() {
        let json = serde_json::to_value(sample_metadata()).unwrap();
        assert_eq!(json["sliceCount"], 3);
        assert_eq!(json["modifyTime"], "2024-05-01T12:00:00Z");
        assert!(json.get("slice_count").is_none());
    }

    #[test]
    fn metadata_checksum_defaults_to_empty() {
        let json = serde_json::json!({
            "fid": "f1",
            "filesize": 0,
            "filename": "empty.bin",
            "sliceCount": 0,
            "modifyTime": "2024-05-01T12:00:00Z"
        });
        let parsed: FileMetadata = serde_json::from_value(json).unwrap();
        assert!(parsed.checksum.is_empty());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransferState::Uploading).unwrap(),
            "\"uploading\""
        );
        assert_eq!(
            serde_json::to_string(&TransferState::Active).unwrap(),
            "\"active\""
        );
    }

    #[test]
    fn file_info_kind_strings() {
        let info = FileInfo {
            filename: "a.txt".into(),
            filesize: 4,
            filetype: FileKind::Slice,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"filetype\":\"slice\""));
    }
}
