//! Sidecar metadata records, one per tracked filename.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slicevault_protocol::{FileMetadata, TransferState};
use tracing::debug;

use crate::{SIDECAR_SUFFIX, TransferError, atomic};

/// The durable record stored for a slice-tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    #[serde(flatten)]
    pub metadata: FileMetadata,
    pub state: TransferState,
}

impl TransferRecord {
    /// Builds the initial `uploading` record for a transfer.
    ///
    /// The declared checksum is not trusted at this point; the record keeps
    /// it empty until finalize stores the recomputed one.
    pub fn uploading(metadata: &FileMetadata) -> Self {
        Self {
            metadata: FileMetadata {
                checksum: String::new(),
                ..metadata.clone()
            },
            state: TransferState::Uploading,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TransferState::Active
    }
}

/// Reads and writes sidecar records under the storage root.
///
/// No caching: every call goes to the file system.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the sidecar record for `filename`.
    pub fn sidecar_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!("{filename}{SIDECAR_SUFFIX}"))
    }

    /// Returns `true` if a sidecar file exists for `filename`, readable or not.
    pub async fn exists(&self, filename: &str) -> bool {
        tokio::fs::metadata(self.sidecar_path(filename))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Writes a new record, failing if one already exists for its filename.
    pub async fn create(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let path = self.sidecar_path(&record.metadata.filename);
        let data = encode(record)?;
        if !atomic::create_new(&path, &data).await? {
            return Err(TransferError::AlreadyExists(record.metadata.filename.clone()));
        }
        debug!(filename = %record.metadata.filename, "metadata record created");
        Ok(())
    }

    /// Loads the record for `filename`.
    pub async fn load(&self, filename: &str) -> Result<TransferRecord, TransferError> {
        self.load_path(&self.sidecar_path(filename)).await
    }

    /// Loads a record from an explicit sidecar path.
    pub async fn load_path(&self, path: &Path) -> Result<TransferRecord, TransferError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(format!(
                    "metadata record {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data).map_err(|e| TransferError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overwrites the record for its filename.
    ///
    /// The new record is written to a temp file and renamed into place, so
    /// a crash leaves either the old record or the new one.
    pub async fn save(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let path = self.sidecar_path(&record.metadata.filename);
        atomic::replace_file(&path, &encode(record)?).await?;
        debug!(
            filename = %record.metadata.filename,
            state = ?record.state,
            "metadata record saved"
        );
        Ok(())
    }
}

fn encode(record: &TransferRecord) -> Result<Vec<u8>, TransferError> {
    serde_json::to_vec_pretty(record).map_err(|e| TransferError::Io(io::Error::other(e)))
}
