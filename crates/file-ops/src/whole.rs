//! Whole-file upload and download, and single-slice download.

use std::io;
use std::path::Path;

use slicevault_protocol::constants::WS_MAX_WHOLE_FILE_SIZE;
use slicevault_transfer::{
    MetadataStore, StagingArea, TransferError, TransferRecord, replace_file, validate_name,
};
use tracing::{debug, info};

use crate::FileOpsError;

/// Writes `data` as the plain file `filename`, replacing any previous one.
///
/// Rejected while a sidecar record claims the name, so a whole upload never
/// shadows a slice transfer.
pub async fn upload_whole(root: &Path, filename: &str, data: &[u8]) -> Result<u64, FileOpsError> {
    validate_name(filename)?;
    if MetadataStore::new(root).exists(filename).await {
        return Err(FileOpsError::AlreadyExists(filename.to_string()));
    }

    replace_file(&root.join(filename), data).await?;
    info!(filename, bytes = data.len(), "whole file uploaded");
    Ok(data.len() as u64)
}

/// Reads a whole file.
///
/// Plain files are read directly. A slice-tracked file is served once
/// `active`, by concatenating its slices in index order. Files too big for a
/// single reply fail with [`FileOpsError::TooLarge`].
pub async fn download_whole(root: &Path, filename: &str) -> Result<Vec<u8>, FileOpsError> {
    download_whole_within(root, filename, WS_MAX_WHOLE_FILE_SIZE as u64).await
}

/// [`download_whole`] with an explicit size limit in bytes.
pub async fn download_whole_within(
    root: &Path,
    filename: &str,
    limit: u64,
) -> Result<Vec<u8>, FileOpsError> {
    validate_name(filename)?;
    let too_large = |size: u64| FileOpsError::TooLarge {
        filename: filename.to_string(),
        size,
        limit,
    };

    match tokio::fs::metadata(root.join(filename)).await {
        Ok(stat) if stat.is_file() => {
            if stat.len() > limit {
                return Err(too_large(stat.len()));
            }
            let data = tokio::fs::read(root.join(filename)).await?;
            if data.len() as u64 > limit {
                return Err(too_large(data.len() as u64));
            }
            return Ok(data);
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let record = load_record(root, filename).await?;
    if !record.is_active() {
        return Err(FileOpsError::NotFound(filename.to_string()));
    }
    let declared = u64::try_from(record.metadata.filesize).unwrap_or(0);
    if declared > limit {
        return Err(too_large(declared));
    }

    let mut data = Vec::with_capacity(declared as usize);
    let total = StagingArea::new(root)
        .read_ordered(&record.metadata.fid, record.metadata.slice_count, |chunk| {
            if data.len() as u64 + chunk.len() as u64 <= limit {
                data.extend_from_slice(chunk);
            }
        })
        .await?;
    if total > limit {
        return Err(too_large(total));
    }
    debug!(filename, bytes = data.len(), "slice-tracked file assembled");
    Ok(data)
}

/// Reads one slice of a slice-tracked file.
pub async fn download_slice(
    root: &Path,
    filename: &str,
    index: u32,
) -> Result<Vec<u8>, FileOpsError> {
    validate_name(filename)?;
    let record = load_record(root, filename).await?;
    if index >= record.metadata.slice_count {
        return Err(FileOpsError::NotFound(format!("{filename} slice {index}")));
    }

    match StagingArea::new(root)
        .read_slice(&record.metadata.fid, index)
        .await
    {
        Ok(data) => Ok(data),
        Err(TransferError::MissingSlice(_)) => {
            Err(FileOpsError::NotFound(format!("{filename} slice {index}")))
        }
        Err(e) => Err(e.into()),
    }
}

async fn load_record(root: &Path, filename: &str) -> Result<TransferRecord, FileOpsError> {
    match MetadataStore::new(root).load(filename).await {
        Ok(record) => Ok(record),
        Err(TransferError::NotFound(_)) => Err(FileOpsError::NotFound(filename.to_string())),
        Err(e) => Err(e.into()),
    }
}
