use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::TransferError;

/// Computes the MD5 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = SliceHasher::new();
    hasher.update(data);
    hasher.finalize_hex()
}

/// Computes the MD5 of an entire file and returns the lowercase hex digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = SliceHasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Compares a declared checksum with a computed one, ignoring hex case.
pub fn checksums_match(declared: &str, computed: &str) -> bool {
    declared.trim().eq_ignore_ascii_case(computed)
}

/// Incremental MD5 over a sequence of slices.
#[derive(Default)]
pub struct SliceHasher {
    inner: Md5,
    bytes: u64,
}

impl SliceHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    /// Total bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
