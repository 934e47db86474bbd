//! SliceVault client.
//!
//! Provides a WebSocket client with id-correlated requests and the
//! resumable upload and verified download flows built on top of it.

pub mod client;
mod downloader;
mod error;
pub(crate) mod pumps;
mod uploader;

pub use client::Client;
pub use downloader::{DownloadReport, Downloader};
pub use error::ClientError;
pub use uploader::{DEFAULT_SLICE_SIZE, UploadOptions, UploadReport, Uploader};
