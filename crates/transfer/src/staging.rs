//! Per-fid staging directories holding one file per received slice.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::{TransferError, atomic, is_temp_name};

/// Read buffer used when streaming slices back out.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Staged slice storage under `<root>/<fid>/<index>`.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self, fid: &str) -> PathBuf {
        self.root.join(fid)
    }

    pub fn slice_path(&self, fid: &str, index: u32) -> PathBuf {
        self.dir(fid).join(index.to_string())
    }

    /// Creates the staging directory for `fid`.
    ///
    /// Fails with [`TransferError::AlreadyExists`] if anything already sits
    /// at that path, so a fid can only ever be staged by one transfer.
    pub async fn create(&self, fid: &str) -> Result<(), TransferError> {
        match tokio::fs::create_dir(self.dir(fid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(TransferError::AlreadyExists(format!("staging directory for {fid}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, fid: &str) -> bool {
        tokio::fs::metadata(self.dir(fid))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Stores slice `index` for `fid`.
    ///
    /// First write wins: returns `Ok(false)` without touching the file when
    /// the slice is already staged. Fails with the underlying I/O error when
    /// the staging directory does not exist.
    pub async fn put(&self, fid: &str, index: u32, data: &[u8]) -> Result<bool, TransferError> {
        let path = self.slice_path(fid, index);
        if tokio::fs::try_exists(&path).await? {
            debug!(fid, index, "slice already staged");
            return Ok(false);
        }
        let stored = atomic::create_new(&path, data).await?;
        if !stored {
            debug!(fid, index, "slice staged concurrently");
        }
        Ok(stored)
    }

    /// Lists the indices currently staged for `fid`.
    ///
    /// Temp files are skipped. Any other entry whose name is not a canonical
    /// decimal index is ignored with a warning.
    pub async fn list_indices(&self, fid: &str) -> Result<BTreeSet<u32>, TransferError> {
        let dir = self.dir(fid);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(format!("staging directory for {fid}")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut indices = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_temp_name(&name) {
                continue;
            }
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            match name.parse::<u32>() {
                Ok(index) if is_file && index.to_string() == name => {
                    indices.insert(index);
                }
                _ => {
                    warn!(fid, entry = %name, "ignoring unexpected entry in staging directory");
                }
            }
        }
        Ok(indices)
    }

    /// Reads one staged slice.
    pub async fn read_slice(&self, fid: &str, index: u32) -> Result<Vec<u8>, TransferError> {
        match tokio::fs::read(self.slice_path(fid, index)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TransferError::MissingSlice(index)),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams slices `0..slice_count` in order into `consume`.
    ///
    /// Every slice is checked for presence before any data is read, so a gap
    /// fails with [`TransferError::MissingSlice`] naming the lowest absent
    /// index and `consume` is never called. Returns the total byte count.
    pub async fn read_ordered<F>(
        &self,
        fid: &str,
        slice_count: u32,
        mut consume: F,
    ) -> Result<u64, TransferError>
    where
        F: FnMut(&[u8]) + Send,
    {
        let present = match self.list_indices(fid).await {
            Ok(present) => present,
            Err(TransferError::NotFound(_)) => BTreeSet::new(),
            Err(e) => return Err(e),
        };
        if let Some(missing) = (0..slice_count).find(|i| !present.contains(i)) {
            return Err(TransferError::MissingSlice(missing));
        }

        let mut total = 0u64;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        for index in 0..slice_count {
            let mut file = match tokio::fs::File::open(self.slice_path(fid, index)).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(TransferError::MissingSlice(index));
                }
                Err(e) => return Err(e.into()),
            };
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                consume(&buf[..n]);
                total += n as u64;
            }
        }
        Ok(total)
    }

    /// Removes the staging directory for `fid` and everything in it.
    pub async fn delete(&self, fid: &str) -> Result<(), TransferError> {
        match tokio::fs::remove_dir_all(self.dir(fid)).await {
            Ok(()) => {
                debug!(fid, "staging directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
