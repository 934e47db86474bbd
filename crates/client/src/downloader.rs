//! Verified download of stored files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use slicevault_protocol::FileKind;
use slicevault_transfer::{SliceHasher, checksums_match};

use crate::{Client, ClientError};

/// Outcome of a completed download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub filename: String,
    pub kind: FileKind,
    pub bytes: u64,
    /// Verified checksum; `None` for plain files, which carry none.
    pub checksum: Option<String>,
}

/// Fetches a stored file into a local path.
///
/// Output goes to `<output>.part` first and is renamed into place only once
/// complete (and, for slice files, once its MD5 matches the record).
pub struct Downloader<'a> {
    client: &'a Client,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn download(&self, filename: &str, output: &Path) -> Result<DownloadReport, ClientError> {
        let info = self.client.get_file_info(filename).await?;
        let part = part_path(output);

        let result = match info.filetype {
            FileKind::Normal => self.fetch_whole(filename, &part).await,
            FileKind::Slice => self.fetch_slices(filename, &part).await,
        };

        let (bytes, checksum) = match result {
            Ok(done) => done,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part, output).await?;
        info!(filename, bytes, output = %output.display(), "download complete");

        Ok(DownloadReport {
            filename: filename.to_owned(),
            kind: info.filetype,
            bytes,
            checksum,
        })
    }

    async fn fetch_whole(
        &self,
        filename: &str,
        part: &Path,
    ) -> Result<(u64, Option<String>), ClientError> {
        let data = self.client.download_file(filename).await?;
        let mut file = tokio::fs::File::create(part).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok((data.len() as u64, None))
    }

    async fn fetch_slices(
        &self,
        filename: &str,
        part: &Path,
    ) -> Result<(u64, Option<String>), ClientError> {
        let metadata = self.client.get_metadata(filename).await?;
        let mut file = tokio::fs::File::create(part).await?;
        let mut hasher = SliceHasher::new();

        for index in 0..metadata.slice_count {
            let data = self.client.download_slice(filename, index).await?;
            hasher.update(&data);
            file.write_all(&data).await?;
        }
        file.sync_all().await?;

        let bytes = hasher.bytes();
        if bytes as i64 != metadata.filesize {
            warn!(filename, bytes, declared = metadata.filesize, "size differs from record");
        }

        let actual = hasher.finalize_hex();
        if !checksums_match(&metadata.checksum, &actual) {
            return Err(ClientError::Integrity {
                expected: metadata.checksum,
                actual,
            });
        }
        Ok((bytes, Some(actual)))
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(part_path(Path::new("out/a.tar.gz")), PathBuf::from("out/a.tar.gz.part"));
    }
}
