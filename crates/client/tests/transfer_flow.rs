//! End-to-end tests against a real server on an OS-assigned port.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use slicevault_client::{Client, DownloadReport, Downloader, UploadOptions, Uploader};
use slicevault_protocol::FileKind;
use slicevault_server::{FileServer, ServerConfig, TransferService};
use slicevault_transfer::{TransferCoordinator, TransferSettings, checksum_bytes};
use tempfile::TempDir;

struct TestServer {
    server: Arc<FileServer<TransferService>>,
    handle: tokio::task::JoinHandle<()>,
    url: String,
    store: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let store = TempDir::new().unwrap();
        let coordinator = TransferCoordinator::new(TransferSettings::new(store.path()));
        coordinator.prepare().await.unwrap();

        let config = ServerConfig {
            address: "127.0.0.1".into(),
            port: 0,
        };
        let server = FileServer::new(config, TransferService::new(coordinator));
        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            runner.run().await.unwrap();
        });

        let mut port = 0;
        for _ in 0..100 {
            port = server.port().await;
            if port > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(port > 0, "server should bind");

        Self {
            server,
            handle,
            url: format!("ws://127.0.0.1:{port}"),
            store,
        }
    }

    async fn client(&self) -> Client {
        Client::connect(&self.url).await.unwrap()
    }

    async fn stop(self) {
        self.server.shutdown();
        self.handle.await.unwrap();
    }
}

/// Deterministic non-repeating test content.
fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn write_local(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn small_slices() -> UploadOptions {
    UploadOptions {
        slice_size: 1024,
        ..UploadOptions::default()
    }
}

async fn download_to(client: &Client, dir: &Path, name: &str) -> (DownloadReport, Vec<u8>) {
    let out = dir.join(format!("{name}.out"));
    let report = Downloader::new(client).download(name, &out).await.unwrap();
    (report, std::fs::read(&out).unwrap())
}

#[tokio::test]
async fn sliced_upload_round_trips() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let data = content(5000);
    let path = write_local(&local, "video.bin", &data);

    let client = srv.client().await;
    client.ping().await.unwrap();

    let report = Uploader::new(&client, small_slices())
        .upload(&path, "video.bin")
        .await
        .unwrap();
    assert_eq!(report.metadata.slice_count, 5);
    assert_eq!(report.metadata.filesize, 5000);
    assert_eq!(report.slices_sent, 5);
    assert_eq!(report.resend_rounds, 0);
    assert_eq!(report.checksum, checksum_bytes(&data));

    let info = client.get_file_info("video.bin").await.unwrap();
    assert_eq!(info.filetype, FileKind::Slice);
    assert_eq!(info.filesize, 5000);

    let meta = client.get_metadata("video.bin").await.unwrap();
    assert_eq!(meta.fid, report.metadata.fid);
    assert_eq!(meta.checksum, report.checksum);

    let (dl, bytes) = download_to(&client, local.path(), "video.bin").await;
    assert_eq!(dl.kind, FileKind::Slice);
    assert_eq!(dl.checksum.as_deref(), Some(report.checksum.as_str()));
    assert_eq!(bytes, data);

    // A finished transfer has nothing left to resend.
    let list = client
        .query_resend_list(&report.metadata.fid, "video.bin")
        .await
        .unwrap();
    assert!(list.is_empty());

    srv.stop().await;
}

#[tokio::test]
async fn json_slices_upload() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let data = content(2500);
    let path = write_local(&local, "doc.pdf", &data);

    let client = srv.client().await;
    let options = UploadOptions {
        binary: false,
        ..small_slices()
    };
    let report = Uploader::new(&client, options).upload(&path, "doc.pdf").await.unwrap();
    assert_eq!(report.metadata.slice_count, 3);

    let part = client.download_slice("doc.pdf", 2).await.unwrap();
    assert_eq!(part, &data[2048..]);

    srv.stop().await;
}

#[tokio::test]
async fn interrupted_upload_resumes() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let data = content(6 * 1024);
    let path = write_local(&local, "disk.img", &data);

    let client = srv.client().await;
    let uploader = Uploader::new(&client, small_slices());
    let meta = uploader.describe(&path, "disk.img", "fid-resume").await.unwrap();
    assert_eq!(meta.slice_count, 6);

    client.begin_transfer(&meta).await.unwrap();
    client.send_slice("fid-resume", 0, &data[..1024]).await.unwrap();
    client.send_slice("fid-resume", 3, &data[3072..4096]).await.unwrap();

    let list = client.query_resend_list("fid-resume", "disk.img").await.unwrap();
    assert_eq!(list, vec![1, 2, 4, -1]);

    // Finalizing early names the first gap.
    let err = client.finalize_transfer(&meta).await.unwrap_err();
    assert!(err.is_missing_slice(), "got {err:?}");

    // Resume on a fresh connection, as after a crash.
    drop(client);
    let client = srv.client().await;
    let report = Uploader::new(&client, small_slices())
        .resume(&path, "disk.img", "fid-resume")
        .await
        .unwrap();
    assert_eq!(report.slices_sent, 4);
    assert_eq!(report.resend_rounds, 1);

    let (_, bytes) = download_to(&client, local.path(), "disk.img").await;
    assert_eq!(bytes, data);

    srv.stop().await;
}

#[tokio::test]
async fn resume_rejects_foreign_fid() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let path = write_local(&local, "a.bin", &content(100));

    let client = srv.client().await;
    let uploader = Uploader::new(&client, small_slices());
    let meta = uploader.describe(&path, "a.bin", "fid-owner").await.unwrap();
    client.begin_transfer(&meta).await.unwrap();

    let err = uploader.resume(&path, "a.bin", "fid-other").await.unwrap_err();
    assert!(matches!(err, slicevault_client::ClientError::Resume(_)), "got {err:?}");

    let err = client.check_exists("fid-other", "a.bin").await.unwrap_err();
    assert!(err.is_bad_request(), "got {err:?}");
    assert!(client.check_exists("fid-owner", "a.bin").await.unwrap());

    srv.stop().await;
}

#[tokio::test]
async fn checksum_mismatch_fails_finalize() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let data = content(3000);
    let path = write_local(&local, "bad.bin", &data);

    let client = srv.client().await;
    let uploader = Uploader::new(&client, small_slices());
    let mut meta = uploader.describe(&path, "bad.bin", "fid-bad").await.unwrap();
    meta.checksum = "00000000000000000000000000000000".into();

    client.begin_transfer(&meta).await.unwrap();
    for (index, chunk) in data.chunks(1024).enumerate() {
        client.send_slice("fid-bad", index as u32, chunk).await.unwrap();
    }

    let err = client.finalize_transfer(&meta).await.unwrap_err();
    assert!(err.is_integrity(), "got {err:?}");

    // The record stays behind in `uploading` and is not listed.
    let record = client.get_metadata("bad.bin").await.unwrap();
    assert_eq!(record.fid, "fid-bad");
    assert!(client.list_files().await.unwrap().is_empty());
    assert!(!srv.store.path().join("fid-bad").exists());

    // Its staging is gone, so a fresh transfer may take the name over.
    let report = uploader.upload(&path, "bad.bin").await.unwrap();
    assert_ne!(report.metadata.fid, "fid-bad");

    srv.stop().await;
}

#[tokio::test]
async fn duplicate_begin_is_rejected() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let path = write_local(&local, "dup.bin", &content(2048));

    let client = srv.client().await;
    let uploader = Uploader::new(&client, small_slices());
    let first = uploader.describe(&path, "dup.bin", "fid-1").await.unwrap();
    client.begin_transfer(&first).await.unwrap();

    let second = uploader.describe(&path, "dup.bin", "fid-2").await.unwrap();
    let err = client.begin_transfer(&second).await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");

    // Completed files block a new begin too.
    uploader.resume(&path, "dup.bin", "fid-1").await.unwrap();
    let err = uploader.upload(&path, "dup.bin").await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");

    srv.stop().await;
}

#[tokio::test]
async fn begin_never_takes_over_existing_data() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let data = content(2048);
    let path = write_local(&local, "one.bin", &data);

    let client = srv.client().await;
    let uploader = Uploader::new(&client, small_slices());
    let first = uploader.describe(&path, "one.bin", "fid-shared").await.unwrap();
    client.begin_transfer(&first).await.unwrap();
    uploader.resume(&path, "one.bin", "fid-shared").await.unwrap();

    // Same fid, different filename.
    let reused = uploader.describe(&path, "two.bin", "fid-shared").await.unwrap();
    let err = client.begin_transfer(&reused).await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
    assert!(client.get_metadata("two.bin").await.unwrap_err().is_not_found());

    // A plain file's name cannot start a slice transfer.
    client.upload_file("notes.txt", b"plain").await.unwrap();
    let err = uploader.upload(&path, "notes.txt").await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");

    let (_, bytes) = download_to(&client, local.path(), "one.bin").await;
    assert_eq!(bytes, data);
    assert_eq!(client.download_file("notes.txt").await.unwrap(), b"plain");
    assert_eq!(client.list_files().await.unwrap().len(), 2);

    srv.stop().await;
}

#[tokio::test]
async fn whole_files_and_listing() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let client = srv.client().await;

    assert_eq!(client.upload_file("notes.txt", b"hello world").await.unwrap(), 11);

    let sliced = write_local(&local, "big.bin", &content(1500));
    Uploader::new(&client, small_slices())
        .upload(&sliced, "big.bin")
        .await
        .unwrap();

    // An unfinished transfer stays out of the listing.
    let pending = Uploader::new(&client, small_slices())
        .describe(&sliced, "pending.bin", "fid-p")
        .await
        .unwrap();
    client.begin_transfer(&pending).await.unwrap();

    let files = client.list_files().await.unwrap();
    let names: Vec<(&str, FileKind, i64)> = files
        .iter()
        .map(|f| (f.filename.as_str(), f.filetype, f.filesize))
        .collect();
    assert_eq!(
        names,
        vec![("big.bin", FileKind::Slice, 1500), ("notes.txt", FileKind::Normal, 11)]
    );

    let (dl, bytes) = download_to(&client, local.path(), "notes.txt").await;
    assert_eq!(dl.kind, FileKind::Normal);
    assert!(dl.checksum.is_none());
    assert_eq!(bytes, b"hello world");

    // Whole download of a slice file concatenates its slices.
    assert_eq!(client.download_file("big.bin").await.unwrap(), content(1500));

    // A sliced name cannot be overwritten by a whole upload.
    let err = client.upload_file("big.bin", b"x").await.unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");

    srv.stop().await;
}

#[tokio::test]
async fn missing_files_are_not_found() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let client = srv.client().await;

    assert!(client.get_metadata("ghost").await.unwrap_err().is_not_found());
    assert!(client.get_file_info("ghost").await.unwrap_err().is_not_found());
    assert!(client.download_file("ghost").await.unwrap_err().is_not_found());
    assert!(client.download_slice("ghost", 0).await.unwrap_err().is_not_found());
    assert!(!client.check_exists("fid", "ghost").await.unwrap());

    let out = local.path().join("ghost.out");
    let err = Downloader::new(&client).download("ghost", &out).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!out.exists());

    let err = client.get_metadata("../escape").await.unwrap_err();
    assert!(err.is_bad_request(), "got {err:?}");

    srv.stop().await;
}

#[tokio::test]
async fn empty_file_uploads() {
    let srv = TestServer::start().await;
    let local = TempDir::new().unwrap();
    let path = write_local(&local, "empty", b"");

    let client = srv.client().await;
    let report = Uploader::new(&client, small_slices())
        .upload(&path, "empty")
        .await
        .unwrap();
    assert_eq!(report.metadata.slice_count, 0);
    assert_eq!(report.checksum, "d41d8cd98f00b204e9800998ecf8427e");

    let (_, bytes) = download_to(&client, local.path(), "empty").await;
    assert!(bytes.is_empty());

    srv.stop().await;
}
