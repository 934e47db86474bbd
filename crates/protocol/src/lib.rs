//! Wire protocol types for SliceVault client/server communication.
//!
//! Every request travels inside a JSON [`Message`] envelope over WebSocket;
//! slice payloads may alternatively use the binary frame format described
//! on [`messages::SliceFrameHeader`] and handled by [`binary`].

pub mod binary;
pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use binary::{ParseError, encode_frame, parse_slice_frame};
pub use constants::{MessageType, RESEND_TAIL};
pub use envelope::{Message, WsError};
pub use types::{FileInfo, FileKind, FileMetadata, TransferState};
