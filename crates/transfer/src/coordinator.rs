use std::path::PathBuf;

use slicevault_protocol::{FileMetadata, TransferState};
use tracing::{debug, info, warn};

use crate::checksum::{SliceHasher, checksums_match};
use crate::gaps::find_resend_slices;
use crate::locks::KeyedLocks;
use crate::metadata::{MetadataStore, TransferRecord};
use crate::staging::StagingArea;
use crate::{TransferError, validate_name};

/// Engine options.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Storage root holding committed files, sidecar records and staging
    /// directories.
    pub store_dir: PathBuf,
    /// Allow `begin` to replace an `uploading` record whose staging
    /// directory has disappeared.
    pub replace_stale_uploads: bool,
}

impl TransferSettings {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            replace_stale_uploads: true,
        }
    }
}

/// Drives the per-file transfer lifecycle:
/// `begin` → `accept_slice`* → `query_resend_list` → `finalize`.
///
/// Operations that read-modify-write a record are serialized per filename.
/// Slice writes take no lock; staging is first-write-wins at the file
/// system level.
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    settings: TransferSettings,
    records: MetadataStore,
    staging: StagingArea,
    locks: KeyedLocks,
}

impl TransferCoordinator {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            records: MetadataStore::new(&settings.store_dir),
            staging: StagingArea::new(&settings.store_dir),
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.records
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Creates the storage root if needed.
    pub async fn prepare(&self) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.settings.store_dir).await?;
        Ok(())
    }

    /// Reports whether `filename` has a record owned by `fid`.
    ///
    /// A record owned by a different fid is an error rather than `false`.
    pub async fn check_exists(&self, fid: &str, filename: &str) -> Result<bool, TransferError> {
        validate_name(filename)?;
        match self.records.load(filename).await {
            Ok(record) if record.metadata.fid == fid => Ok(true),
            Ok(record) => Err(fid_mismatch(filename, &record, fid)),
            Err(TransferError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Starts a transfer: creates the staging directory and writes an
    /// `uploading` record.
    ///
    /// Fails with [`TransferError::AlreadyExists`] if `filename` already has
    /// a live record or is stored as a plain file, or if the fid is already
    /// staged. A stale `uploading` record (its staging directory is gone) or
    /// an unreadable one is replaced.
    pub async fn begin(&self, metadata: &FileMetadata) -> Result<(), TransferError> {
        validate_name(&metadata.filename)?;
        validate_name(&metadata.fid)?;
        let _guard = self.locks.lock(&metadata.filename).await;

        let plain = self.settings.store_dir.join(&metadata.filename);
        if tokio::fs::metadata(&plain).await.is_ok_and(|m| m.is_file()) {
            return Err(TransferError::AlreadyExists(format!(
                "{} is stored as a plain file",
                metadata.filename
            )));
        }

        let record = TransferRecord::uploading(metadata);
        match self.records.load(&metadata.filename).await {
            Ok(existing) => {
                if !self.is_replaceable(&existing).await {
                    return Err(TransferError::AlreadyExists(metadata.filename.clone()));
                }
                warn!(
                    filename = %metadata.filename,
                    stale_fid = %existing.metadata.fid,
                    fid = %metadata.fid,
                    "replacing stale upload record"
                );
                self.staging.create(&metadata.fid).await?;
                self.records.save(&record).await?;
            }
            Err(TransferError::NotFound(_)) => {
                self.staging.create(&metadata.fid).await?;
                self.records.create(&record).await?;
            }
            Err(TransferError::Corrupt { path, reason }) => {
                warn!(path = %path.display(), %reason, "overwriting unreadable metadata record");
                self.staging.create(&metadata.fid).await?;
                self.records.save(&record).await?;
            }
            Err(e) => return Err(e),
        }

        info!(
            fid = %metadata.fid,
            filename = %metadata.filename,
            slices = metadata.slice_count,
            size = metadata.filesize,
            "transfer begun"
        );
        Ok(())
    }

    async fn is_replaceable(&self, existing: &TransferRecord) -> bool {
        self.settings.replace_stale_uploads
            && existing.state == TransferState::Uploading
            && !self.staging.exists(&existing.metadata.fid).await
    }

    /// Stores one slice. Returns `false` if that slice was already staged.
    pub async fn accept_slice(
        &self,
        fid: &str,
        index: u32,
        data: &[u8],
    ) -> Result<bool, TransferError> {
        validate_name(fid)?;
        let stored = self.staging.put(fid, index, data).await?;
        debug!(fid, index, bytes = data.len(), stored, "slice accepted");
        Ok(stored)
    }

    /// Computes the compact list of slices the client still has to send.
    ///
    /// A finalized transfer has nothing left to send.
    pub async fn query_resend_list(
        &self,
        fid: &str,
        filename: &str,
    ) -> Result<Vec<i64>, TransferError> {
        validate_name(filename)?;
        validate_name(fid)?;
        let _guard = self.locks.lock(filename).await;

        let record = self.records.load(filename).await?;
        if record.metadata.fid != fid {
            return Err(fid_mismatch(filename, &record, fid));
        }
        if record.is_active() {
            return Ok(Vec::new());
        }

        let present = self.staging.list_indices(fid).await?;
        let resend = find_resend_slices(&present, record.metadata.slice_count);
        debug!(
            fid,
            filename,
            staged = present.len(),
            resend = ?resend,
            "resend list computed"
        );
        Ok(resend)
    }

    /// Verifies the staged slices against the declared checksum and marks the
    /// file `active`.
    ///
    /// On a checksum mismatch the staged slices are discarded and the record
    /// stays `uploading`, so the client must begin again. Finalizing an
    /// already active file with its committed checksum succeeds without
    /// rehashing. Returns the committed checksum.
    pub async fn finalize(&self, metadata: &FileMetadata) -> Result<String, TransferError> {
        validate_name(&metadata.filename)?;
        validate_name(&metadata.fid)?;
        let _guard = self.locks.lock(&metadata.filename).await;

        let mut record = self.records.load(&metadata.filename).await?;
        if record.metadata.fid != metadata.fid {
            return Err(fid_mismatch(&metadata.filename, &record, &metadata.fid));
        }

        if record.is_active() && checksums_match(&metadata.checksum, &record.metadata.checksum) {
            debug!(filename = %metadata.filename, "transfer already finalized");
            return Ok(record.metadata.checksum);
        }

        let mut hasher = SliceHasher::new();
        let bytes = self
            .staging
            .read_ordered(&metadata.fid, record.metadata.slice_count, |chunk| {
                hasher.update(chunk);
            })
            .await?;
        let computed = hasher.finalize_hex();

        if !checksums_match(&metadata.checksum, &computed) {
            warn!(
                fid = %metadata.fid,
                filename = %metadata.filename,
                expected = %metadata.checksum,
                actual = %computed,
                "checksum mismatch, discarding staged slices"
            );
            if !record.is_active() {
                self.staging.delete(&metadata.fid).await?;
            }
            return Err(TransferError::IntegrityError {
                expected: metadata.checksum.clone(),
                actual: computed,
            });
        }

        if bytes != u64::try_from(record.metadata.filesize).unwrap_or(u64::MAX) {
            warn!(
                filename = %metadata.filename,
                declared = record.metadata.filesize,
                actual = bytes,
                "staged size differs from declared filesize"
            );
        }

        record.metadata.checksum = computed.clone();
        record.state = TransferState::Active;
        self.records.save(&record).await?;

        info!(
            fid = %metadata.fid,
            filename = %metadata.filename,
            bytes,
            checksum = %computed,
            "transfer finalized"
        );
        Ok(computed)
    }

    /// Returns the stored metadata for `filename`.
    pub async fn get_metadata(&self, filename: &str) -> Result<TransferRecord, TransferError> {
        validate_name(filename)?;
        self.records.load(filename).await
    }
}

fn fid_mismatch(filename: &str, record: &TransferRecord, fid: &str) -> TransferError {
    TransferError::FidMismatch {
        filename: filename.to_string(),
        expected: record.metadata.fid.clone(),
        actual: fid.to_string(),
    }
}
