//! File catalog over the storage root.

use std::io;
use std::path::Path;

use slicevault_protocol::{FileInfo, FileKind};
use slicevault_transfer::{
    MetadataStore, SIDECAR_SUFFIX, TransferError, is_temp_name, validate_name,
};
use tracing::warn;

use crate::FileOpsError;

/// Describes a single file.
///
/// A plain file under `root` wins over a slice-tracked one of the same name.
/// A slice-tracked file is reported with its declared size whatever its
/// state.
pub async fn file_info(root: &Path, filename: &str) -> Result<FileInfo, FileOpsError> {
    validate_name(filename)?;

    match tokio::fs::metadata(root.join(filename)).await {
        Ok(meta) if meta.is_file() => {
            return Ok(FileInfo {
                filename: filename.to_string(),
                filesize: i64::try_from(meta.len()).unwrap_or(i64::MAX),
                filetype: FileKind::Normal,
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    match MetadataStore::new(root).load(filename).await {
        Ok(record) => Ok(FileInfo {
            filename: record.metadata.filename,
            filesize: record.metadata.filesize,
            filetype: FileKind::Slice,
        }),
        Err(TransferError::NotFound(_)) => Err(FileOpsError::NotFound(filename.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Lists the files a client can download, sorted by name.
///
/// Plain files are listed as `normal`. Sidecar records are listed as `slice`
/// only once their transfer is `active`; unreadable records are skipped with
/// a warning. Temp files and staging directories never appear.
pub async fn list_files(root: &Path) -> Result<Vec<FileInfo>, FileOpsError> {
    let store = MetadataStore::new(root);
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut result = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_temp_name(&name) {
            continue;
        }

        if name.ends_with(SIDECAR_SUFFIX) {
            match store.load_path(&entry.path()).await {
                Ok(record) if record.is_active() => result.push(FileInfo {
                    filename: record.metadata.filename,
                    filesize: record.metadata.filesize,
                    filetype: FileKind::Slice,
                }),
                Ok(_) => {}
                Err(e) => warn!(entry = %name, error = %e, "skipping unreadable metadata record"),
            }
            continue;
        }

        result.push(FileInfo {
            filename: name,
            filesize: i64::try_from(meta.len()).unwrap_or(i64::MAX),
            filetype: FileKind::Normal,
        });
    }

    result.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(result)
}
