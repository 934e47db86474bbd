//! Resumable sliced transfer engine.
//!
//! A file arrives as independently-sent slices addressed by `(fid, index)`.
//! The engine keeps one sidecar record per target filename
//! ([`MetadataStore`]), one staging directory per fid ([`StagingArea`]),
//! computes which slices a client still has to send
//! ([`find_resend_slices`]), and commits a file once the MD5 of its ordered
//! slices matches the declared checksum ([`TransferCoordinator`]).

mod atomic;
mod checksum;
mod coordinator;
mod gaps;
mod locks;
mod metadata;
mod staging;
mod validation;

use std::path::PathBuf;

use slicevault_protocol::constants::{
    WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_CONFLICT, WS_ERR_CODE_INTEGRITY, WS_ERR_CODE_INTERNAL,
    WS_ERR_CODE_MISSING_SLICE, WS_ERR_CODE_NOT_FOUND,
};

pub use atomic::replace_file;
pub use checksum::{SliceHasher, calculate_file_checksum, checksum_bytes, checksums_match};
pub use coordinator::{TransferCoordinator, TransferSettings};
pub use gaps::{expand_resend_list, find_resend_slices};
pub use locks::{KeyGuard, KeyedLocks};
pub use metadata::{MetadataStore, TransferRecord};
pub use slicevault_protocol::RESEND_TAIL;
pub use staging::StagingArea;
pub use validation::{is_temp_name, validate_name};

/// Suffix appended to a filename to form its sidecar record name.
pub const SIDECAR_SUFFIX: &str = ".slice";

/// Marker embedded in the names of in-flight temp files.
pub const TEMP_MARKER: &str = ".tmp.";

/// Errors produced by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt metadata record {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("checksum mismatch: declared {expected}, computed {actual}")]
    IntegrityError { expected: String, actual: String },

    #[error("missing slice {0}")]
    MissingSlice(u32),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("fid {actual} does not own {filename} (record belongs to {expected})")]
    FidMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
}

impl TransferError {
    /// Wire error code reported to clients.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidName(_) | Self::FidMismatch { .. } => WS_ERR_CODE_BAD_REQUEST,
            Self::NotFound(_) => WS_ERR_CODE_NOT_FOUND,
            Self::AlreadyExists(_) => WS_ERR_CODE_CONFLICT,
            Self::MissingSlice(_) => WS_ERR_CODE_MISSING_SLICE,
            Self::IntegrityError { .. } => WS_ERR_CODE_INTEGRITY,
            Self::Corrupt { .. } | Self::Io(_) => WS_ERR_CODE_INTERNAL,
        }
    }
}
