//! Temp-file-then-publish writes.
//!
//! Data is written under a unique `<name>.tmp.<uuid>` sibling and fsynced
//! before it becomes visible under its final name, so readers never see a
//! partially written file.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::TEMP_MARKER;

/// Writes `data` to a fresh temp file next to `target` and fsyncs it.
async fn write_temp(target: &Path, data: &[u8]) -> io::Result<PathBuf> {
    let temp_name = format!(
        "{}{TEMP_MARKER}{}",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        uuid::Uuid::new_v4()
    );
    let temp_path = target.with_file_name(temp_name);

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;

    match result {
        Ok(()) => Ok(temp_path),
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

/// Atomically replaces `target` with `data`.
pub async fn replace_file(target: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = write_temp(target, data).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, target).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Atomically creates `target` with `data` unless it already exists.
///
/// Returns `Ok(false)` when `target` was already present; its contents are
/// left untouched.
pub(crate) async fn create_new(target: &Path, data: &[u8]) -> io::Result<bool> {
    let temp_path = write_temp(target, data).await?;
    let linked = tokio::fs::hard_link(&temp_path, target).await;
    let _ = tokio::fs::remove_file(&temp_path).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn replace_overwrites_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("record");

        replace_file(&target, b"first").await.unwrap();
        replace_file(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert_eq!(entry_names(dir.path()), vec!["record"]);
    }

    #[tokio::test]
    async fn create_new_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("0");

        assert!(create_new(&target, b"original").await.unwrap());
        assert!(!create_new(&target, b"duplicate").await.unwrap());

        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        assert_eq!(entry_names(dir.path()), vec!["0"]);
    }

    #[tokio::test]
    async fn missing_parent_is_an_error() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("absent").join("0");
        let err = create_new(&target, b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
