//! File operations on the storage root that sit beside the slice engine.
//!
//! Provides the file catalog (info and listing over plain files and
//! slice-tracked files) and whole-file upload and download.

mod catalog;
mod whole;

pub use catalog::{file_info, list_files};
pub use whole::{download_slice, download_whole, download_whole_within, upload_whole};

use slicevault_protocol::constants::{
    WS_ERR_CODE_CONFLICT, WS_ERR_CODE_NOT_FOUND, WS_ERR_CODE_TOO_LARGE,
};
use slicevault_transfer::TransferError;

/// Errors produced by catalog and whole-file operations.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file is tracked as a slice transfer: {0}")]
    AlreadyExists(String),

    #[error("{filename} is {size} bytes, over the {limit} byte whole-file limit; fetch it by slice")]
    TooLarge { filename: String, size: u64, limit: u64 },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl FileOpsError {
    /// Wire error code reported to clients.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => WS_ERR_CODE_NOT_FOUND,
            Self::AlreadyExists(_) => WS_ERR_CODE_CONFLICT,
            Self::TooLarge { .. } => WS_ERR_CODE_TOO_LARGE,
            Self::Transfer(e) => e.code(),
        }
    }
}

impl From<std::io::Error> for FileOpsError {
    fn from(e: std::io::Error) -> Self {
        Self::Transfer(TransferError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_wrapped_error() {
        assert_eq!(FileOpsError::NotFound("a".into()).code(), 404);
        assert_eq!(FileOpsError::AlreadyExists("a".into()).code(), 409);
        let too_large = FileOpsError::TooLarge {
            filename: "a".into(),
            size: 10,
            limit: 4,
        };
        assert_eq!(too_large.code(), 413);
        assert!(too_large.to_string().contains("by slice"));
        assert_eq!(
            FileOpsError::from(TransferError::InvalidName("..".into())).code(),
            400
        );
        assert_eq!(FileOpsError::from(std::io::Error::other("disk")).code(), 500);
    }
}
