use std::path::{Component, Path};

use crate::{SIDECAR_SUFFIX, TEMP_MARKER, TransferError};

/// Validates a filename or fid used as a key under the storage root.
///
/// Keys map onto a flat namespace, so a valid key is exactly one normal
/// path component. Rejects:
/// - Empty names, `.` and `..`
/// - Any path separator (`/` or `\`)
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - Names ending in the sidecar suffix or carrying the temp-file marker
pub fn validate_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::ParentDir), _) | (Some(Component::CurDir), _) => {
            return Err(TransferError::InvalidName(format!(
                "relative directory reference not allowed: {name}"
            )));
        }
        (Some(Component::Prefix(_)), _) | (Some(Component::RootDir), _) => {
            return Err(TransferError::InvalidName(format!(
                "absolute path not allowed: {name}"
            )));
        }
        _ => {
            return Err(TransferError::InvalidName(format!(
                "name must be a single component: {name}"
            )));
        }
    }

    if name.ends_with(SIDECAR_SUFFIX) {
        return Err(TransferError::InvalidName(format!(
            "reserved suffix {SIDECAR_SUFFIX}: {name}"
        )));
    }

    if is_temp_name(name) {
        return Err(TransferError::InvalidName(format!(
            "reserved marker {TEMP_MARKER}: {name}"
        )));
    }

    Ok(())
}

/// Returns `true` for names of in-flight temp files.
pub fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}
