//! Resumable sliced upload.

use std::io::SeekFrom;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use slicevault_protocol::FileMetadata;
use slicevault_transfer::{SliceHasher, checksums_match, expand_resend_list};

use crate::{Client, ClientError};

/// Default slice size: 1 MiB.
pub const DEFAULT_SLICE_SIZE: usize = 1024 * 1024;

/// Tuning for [`Uploader`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bytes per slice; the last slice may be shorter.
    pub slice_size: usize,
    /// How many `query_resend_list` rounds to run before giving up.
    pub max_rounds: usize,
    /// Send slices as binary frames instead of base64 JSON.
    pub binary: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            slice_size: DEFAULT_SLICE_SIZE,
            max_rounds: 3,
            binary: true,
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Metadata declared to the server.
    pub metadata: FileMetadata,
    /// Slices written to the socket, resends included.
    pub slices_sent: usize,
    /// Resend rounds that found missing slices.
    pub resend_rounds: usize,
    /// Checksum the server computed at finalize.
    pub checksum: String,
}

/// Drives begin, slice delivery, gap recovery and finalize over a [`Client`].
pub struct Uploader<'a> {
    client: &'a Client,
    options: UploadOptions,
}

impl<'a> Uploader<'a> {
    pub fn new(client: &'a Client, options: UploadOptions) -> Self {
        Self { client, options }
    }

    /// Uploads `path` under `filename` as a new transfer with a fresh fid.
    pub async fn upload(&self, path: &Path, filename: &str) -> Result<UploadReport, ClientError> {
        let fid = uuid::Uuid::new_v4().to_string();
        let metadata = self.describe(path, filename, &fid).await?;
        info!(
            fid = %metadata.fid,
            filename,
            slice_count = metadata.slice_count,
            filesize = metadata.filesize,
            "starting upload"
        );

        self.client.begin_transfer(&metadata).await?;

        let all: Vec<u32> = (0..metadata.slice_count).collect();
        let sent = self.send_slices(path, &metadata.fid, &all).await?;
        self.complete(path, metadata, sent).await
    }

    /// Continues an interrupted transfer identified by `fid`.
    ///
    /// Skips `begin` and sends only what the server reports missing. The
    /// local file must still match what was declared when the transfer began.
    pub async fn resume(
        &self,
        path: &Path,
        filename: &str,
        fid: &str,
    ) -> Result<UploadReport, ClientError> {
        let metadata = self.describe(path, filename, fid).await?;

        let record = self.client.get_metadata(filename).await?;
        if record.fid != fid {
            return Err(ClientError::Resume(format!(
                "{filename} belongs to transfer {}",
                record.fid
            )));
        }
        if record.filesize != metadata.filesize || record.slice_count != metadata.slice_count {
            return Err(ClientError::Resume(format!(
                "{filename} was declared as {} bytes in {} slices, local file has {} bytes in {} slices",
                record.filesize, record.slice_count, metadata.filesize, metadata.slice_count
            )));
        }

        info!(fid, filename, slice_count = metadata.slice_count, "resuming upload");
        self.complete(path, metadata, 0).await
    }

    /// Builds the metadata declared for `path`: size, slice count, MD5 and
    /// modification time.
    pub async fn describe(
        &self,
        path: &Path,
        filename: &str,
        fid: &str,
    ) -> Result<FileMetadata, ClientError> {
        let mut file = tokio::fs::File::open(path).await?;
        let stat = file.metadata().await?;
        let modify_time: DateTime<Utc> = stat.modified().map(Into::into).unwrap_or_else(|_| Utc::now());

        let mut hasher = SliceHasher::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let filesize = hasher.bytes();
        let slice_size = self.options.slice_size.max(1) as u64;
        let slice_count = u32::try_from(filesize.div_ceil(slice_size)).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} needs more than {} slices", path.display(), u32::MAX),
            )
        })?;

        Ok(FileMetadata {
            fid: fid.to_owned(),
            filesize: filesize as i64,
            filename: filename.to_owned(),
            slice_count,
            checksum: hasher.finalize_hex(),
            modify_time,
        })
    }

    /// Runs resend rounds until nothing is missing, then finalizes.
    async fn complete(
        &self,
        path: &Path,
        metadata: FileMetadata,
        mut slices_sent: usize,
    ) -> Result<UploadReport, ClientError> {
        let mut resend_rounds = 0;

        loop {
            let list = self
                .client
                .query_resend_list(&metadata.fid, &metadata.filename)
                .await?;
            let missing = expand_resend_list(&list, metadata.slice_count);
            if missing.is_empty() {
                break;
            }
            if resend_rounds == self.options.max_rounds {
                warn!(fid = %metadata.fid, missing = missing.len(), "giving up after resend rounds");
                return Err(ClientError::Incomplete {
                    missing: missing.len(),
                });
            }
            resend_rounds += 1;
            debug!(fid = %metadata.fid, round = resend_rounds, missing = missing.len(), "resending");
            slices_sent += self.send_slices(path, &metadata.fid, &missing).await?;
        }

        let checksum = self.client.finalize_transfer(&metadata).await?;
        if !checksums_match(&metadata.checksum, &checksum) {
            return Err(ClientError::Integrity {
                expected: metadata.checksum,
                actual: checksum,
            });
        }

        info!(fid = %metadata.fid, filename = %metadata.filename, slices_sent, "upload finalized");
        Ok(UploadReport {
            metadata,
            slices_sent,
            resend_rounds,
            checksum,
        })
    }

    /// Reads and sends the given slices of `path`; returns how many were sent.
    async fn send_slices(&self, path: &Path, fid: &str, indices: &[u32]) -> Result<usize, ClientError> {
        let mut file = tokio::fs::File::open(path).await?;
        let slice_size = self.options.slice_size.max(1);
        let mut buf = vec![0u8; slice_size];

        for &index in indices {
            file.seek(SeekFrom::Start(index as u64 * slice_size as u64)).await?;
            let len = read_full(&mut file, &mut buf).await?;
            let data = &buf[..len];

            let accepted = if self.options.binary {
                self.client.send_slice(fid, index, data).await?
            } else {
                self.client.accept_slice(fid, index, data).await?
            };
            if !accepted.stored {
                debug!(fid, index, "slice already on server");
            }
        }

        Ok(indices.len())
    }
}

/// Fills `buf` from `file`, stopping early only at end of file.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = UploadOptions::default();
        assert_eq!(opts.slice_size, 1024 * 1024);
        assert_eq!(opts.max_rounds, 3);
        assert!(opts.binary);
    }

    #[tokio::test]
    async fn read_full_stops_at_eof() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        tokio::fs::write(&path, b"abcde").await.unwrap();

        let mut file = tokio::fs::File::open(&path).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 1);
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 0);
    }
}
