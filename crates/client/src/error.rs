use slicevault_protocol::constants::{
    WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_CONFLICT, WS_ERR_CODE_INTEGRITY,
    WS_ERR_CODE_MISSING_SLICE, WS_ERR_CODE_NOT_FOUND, WS_ERR_CODE_TOO_LARGE,
};
use tokio_tungstenite::tungstenite;

/// Errors from the SliceVault client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("checksum mismatch: expected {expected}, downloaded {actual}")]
    Integrity { expected: String, actual: String },

    #[error("cannot resume: {0}")]
    Resume(String),

    #[error("upload incomplete: {missing} slices still missing")]
    Incomplete { missing: usize },
}

impl ClientError {
    /// Wire code of a server-side failure, if this is one.
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.server_code() == Some(WS_ERR_CODE_NOT_FOUND)
    }

    pub fn is_already_exists(&self) -> bool {
        self.server_code() == Some(WS_ERR_CODE_CONFLICT)
    }

    pub fn is_missing_slice(&self) -> bool {
        self.server_code() == Some(WS_ERR_CODE_MISSING_SLICE)
    }

    /// `true` for a server checksum mismatch as well as a local one.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. }) || self.server_code() == Some(WS_ERR_CODE_INTEGRITY)
    }

    pub fn is_bad_request(&self) -> bool {
        self.server_code() == Some(WS_ERR_CODE_BAD_REQUEST)
    }

    /// The file is too big for `download_file`; fetch it by slice instead.
    pub fn is_too_large(&self) -> bool {
        self.server_code() == Some(WS_ERR_CODE_TOO_LARGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_display() {
        assert_eq!(ClientError::Timeout.to_string(), "request timed out");
        assert_eq!(ClientError::Closed.to_string(), "connection closed");

        let err = ClientError::Server {
            code: 409,
            message: "already exists: a.bin".into(),
        };
        assert!(err.to_string().contains("409"));
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    #[test]
    fn predicates_follow_wire_codes() {
        let server = |code| ClientError::Server {
            code,
            message: String::new(),
        };
        assert!(server(404).is_not_found());
        assert!(server(412).is_missing_slice());
        assert!(server(422).is_integrity());
        assert!(server(400).is_bad_request());
        assert!(server(413).is_too_large());
        assert!(!server(409).is_too_large());
        assert!(
            ClientError::Integrity {
                expected: "a".into(),
                actual: "b".into()
            }
            .is_integrity()
        );
        assert_eq!(ClientError::Timeout.server_code(), None);
    }
}
