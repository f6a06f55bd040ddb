use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use filebin_client::{
    ArchiveFormat, BinSession, ByteStream, CipherAlgorithm, CipherParams, ClientConfig, Error,
    Filebin, Transport,
};
use filebin_core::{TransportRequest, TransportResponse};
use filebin_transport_memory::{MemoryService, qr_placeholder_prefix};
use http::Method;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tempfile::TempDir;

struct Fixture {
    service: Arc<MemoryService>,
    client: Filebin,
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MemoryService::new());
        let config = ClientConfig {
            scratch_dir: dir.path().join("scratch"),
            chunk_size: 100,
            ..Default::default()
        };
        let client = Filebin::new(service.clone(), config);
        Self {
            service,
            client,
            dir,
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = self.path(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Number of entries left in the scratch directory.
    fn scratch_entries(&self) -> usize {
        match std::fs::read_dir(self.path("scratch")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    async fn bin(&self) -> BinSession {
        self.client.create_bin(Some("abc123")).await.unwrap()
    }
}

fn bytes_stream(data: &'static [u8]) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = data
        .chunks(7)
        .map(|c| Ok(Bytes::from_static(c)))
        .collect();
    Box::new(futures::stream::iter(chunks))
}

#[tokio::test]
async fn upload_appends_the_returned_record() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "existing.txt", "x");
    let mut bin = fx.bin().await;
    let report = fx.write("report.pdf", &[42u8; 1024]);

    let record = bin.upload_file(&report, None).await?;
    assert_eq!(record.filename(), "report.pdf");
    assert_eq!(record.bytes(), 1024);
    assert_eq!(bin.files().len(), 2);
    assert_eq!(bin.files().last(), Some(&record));

    let request = fx.service.requests().pop().unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, ["abc123", "report.pdf"]);
    assert_eq!(request.body_len, Some(1024));
    assert_eq!(request.headers[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        fx.service.file_data("abc123", "report.pdf").unwrap(),
        vec![42u8; 1024]
    );
    Ok(())
}

#[tokio::test]
async fn upload_can_rename_and_reupload_replaces() -> Result<()> {
    let fx = Fixture::new();
    let mut bin = fx.bin().await;
    let path = fx.write("local.txt", b"first");

    bin.upload_file(&path, Some("remote.txt")).await?;
    bin.upload_stream("remote.txt", bytes_stream(b"second version"), 14)
        .await?;

    assert_eq!(bin.files().len(), 1);
    assert_eq!(bin.files()[0].bytes(), 14);
    assert_eq!(
        fx.service.file_data("abc123", "remote.txt").unwrap(),
        &b"second version"[..]
    );
    Ok(())
}

#[tokio::test]
async fn readonly_session_rejects_uploads_without_requests() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "a.txt", "x");
    let mut bin = fx.bin().await;
    bin.lock().await?;
    let path = fx.write("b.txt", b"y");
    fx.service.clear_requests();

    assert!(matches!(bin.upload_file(&path, None).await, Err(Error::BinLocked)));
    assert!(matches!(
        bin.upload_stream("b.txt", bytes_stream(b"y"), 1).await,
        Err(Error::BinLocked)
    ));
    assert!(matches!(
        bin.upload_encrypted_file(&path, None).await,
        Err(Error::BinLocked)
    ));
    assert_eq!(fx.service.request_count(), 0);
    assert_eq!(fx.scratch_entries(), 0);
    Ok(())
}

#[tokio::test]
async fn remote_lock_surfaces_as_bin_locked() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "a.txt", "x");
    let mut bin = fx.bin().await;
    fx.service.set_readonly("abc123", true);

    let err = bin
        .upload_stream("b.txt", bytes_stream(b"y"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BinLocked));
    assert_eq!(bin.files().len(), 1);
    Ok(())
}

#[tokio::test]
async fn upload_status_codes_map_to_errors() -> Result<()> {
    let fx = Fixture::new();
    let mut bin = fx.bin().await;

    let short = bin.upload_stream("a.txt", bytes_stream(b"abc"), 10).await;
    assert!(matches!(short, Err(Error::InvalidInput)));

    fx.service.set_storage_limit(2);
    let big = bin.upload_stream("a.txt", bytes_stream(b"abc"), 3).await;
    assert!(matches!(big, Err(Error::StorageLimitReached)));

    fx.service.set_offline(true);
    let offline = bin.upload_stream("a.txt", bytes_stream(b"a"), 1).await;
    assert!(matches!(
        offline,
        Err(Error::TransportFailure { status: None, .. })
    ));

    assert!(bin.files().is_empty());
    Ok(())
}

#[tokio::test]
async fn encrypted_round_trip() -> Result<()> {
    let fx = Fixture::new();
    let mut bin = fx.bin().await;
    let plaintext: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let secret = fx.write("secret.txt", &plaintext);

    let upload = bin.upload_encrypted_file(&secret, None).await?;
    assert_eq!(upload.file.filename(), "secret.txt.enc");
    assert_eq!(upload.params.algorithm(), CipherAlgorithm::Aes256Cbc);
    assert_eq!(upload.params.key().len(), 32);
    assert_eq!(upload.params.iv().len(), 16);
    assert_eq!(fx.scratch_entries(), 0);

    let stored = fx.service.file_data("abc123", "secret.txt.enc").unwrap();
    assert_eq!(stored.len() as u64, CipherAlgorithm::Aes256Cbc.ciphertext_len(1000));
    assert_ne!(&stored[..16], &plaintext[..16]);

    let out = fx.path("out");
    std::fs::create_dir(&out)?;
    let written = bin
        .download_encrypted_file("secret.txt.enc", &upload.params, Some(&out))
        .await?;
    assert_eq!(written, out.join("secret.txt"));
    assert_eq!(std::fs::read(&written)?, plaintext);

    // the plain name works too
    let again = bin
        .download_encrypted_file("secret.txt", &upload.params, Some(&out))
        .await?;
    assert_eq!(again, written);
    Ok(())
}

#[tokio::test]
async fn encrypted_upload_with_supplied_params() -> Result<()> {
    let fx = Fixture::new();
    let mut bin = fx.bin().await;
    let path = fx.write("notes.md", b"sixteen byte msg");
    let params = CipherParams::new(CipherAlgorithm::Aes128Cbc, [7u8; 16], &[9u8; 16])?;

    let upload = bin.upload_encrypted_file(&path, Some(params.clone())).await?;
    assert_eq!(upload.params, params);
    assert_eq!(upload.file.bytes(), 32);
    Ok(())
}

#[tokio::test]
async fn scratch_artifact_is_removed_when_upload_fails() -> Result<()> {
    let fx = Fixture::new();
    let mut bin = fx.bin().await;
    let path = fx.write("secret.txt", b"top secret");
    fx.service.set_storage_limit(0);

    let err = bin.upload_encrypted_file(&path, None).await.unwrap_err();
    assert!(matches!(err, Error::StorageLimitReached));
    assert!(fx.path("scratch").is_dir());
    assert_eq!(fx.scratch_entries(), 0);
    assert!(bin.files().is_empty());
    Ok(())
}

/// Delegates to the in-memory service, but empties the scratch directory
/// once an upload has been accepted.
#[derive(Debug)]
struct SweepsScratch {
    inner: Arc<MemoryService>,
    scratch_dir: PathBuf,
}

#[async_trait]
impl Transport for SweepsScratch {
    async fn send(&self, request: TransportRequest) -> filebin_core::Result<TransportResponse> {
        let is_upload = request.method == Method::POST;
        let response = self.inner.send(request).await?;
        if is_upload {
            for entry in std::fs::read_dir(&self.scratch_dir)? {
                std::fs::remove_file(entry?.path())?;
            }
        }
        Ok(response)
    }

    fn base_url(&self) -> &str {
        self.inner.base_url()
    }
}

#[tokio::test]
async fn failed_scratch_cleanup_still_hands_back_the_key() -> Result<()> {
    let fx = Fixture::new();
    let scratch_dir = fx.path("scratch");
    let transport = SweepsScratch {
        inner: fx.service.clone(),
        scratch_dir: scratch_dir.clone(),
    };
    let config = ClientConfig {
        scratch_dir,
        ..Default::default()
    };
    let client = Filebin::new(Arc::new(transport), config);
    let mut bin = client.create_bin(Some("abc123")).await?;
    let secret = fx.write("secret.txt", b"keep the key");

    let err = bin.upload_encrypted_file(&secret, None).await.unwrap_err();
    assert!(matches!(err, Error::ScratchCleanupFailed { .. }));
    let upload = err.uploaded().expect("upload went through").clone();
    assert_eq!(upload.file.filename(), "secret.txt.enc");
    assert_eq!(bin.files(), [upload.file.clone()]);
    assert!(fx.service.file_data("abc123", "secret.txt.enc").is_some());

    let out = fx.path("out");
    std::fs::create_dir(&out)?;
    let written = bin
        .download_encrypted_file("secret.txt.enc", &upload.params, Some(&out))
        .await?;
    assert_eq!(std::fs::read(written)?, b"keep the key");
    Ok(())
}

#[tokio::test]
async fn concurrent_encrypted_uploads_do_not_collide() -> Result<()> {
    let fx = Fixture::new();
    let mut first = fx.bin().await;
    let mut second = fx.bin().await;
    let a = fx.write("a.txt", &[1u8; 5000]);
    let b = fx.write("b.txt", &[2u8; 5000]);

    let (ra, rb) = tokio::join!(
        first.upload_encrypted_file(&a, None),
        second.upload_encrypted_file(&b, None)
    );
    ra?;
    rb?;
    let mut names = fx.service.file_names("abc123");
    names.sort();
    assert_eq!(names, ["a.txt.enc", "b.txt.enc"]);
    assert_eq!(fx.scratch_entries(), 0);
    Ok(())
}

#[tokio::test]
async fn download_writes_file_with_curl_user_agent() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "data.bin", vec![5u8; 300]);
    let bin = fx.bin().await;

    let dest = fx.path("copy.bin");
    let written = bin.download_file("data.bin", Some(&dest)).await?;
    assert_eq!(written, dest);
    assert_eq!(std::fs::read(&dest)?, vec![5u8; 300]);

    let request = fx.service.requests().pop().unwrap();
    assert_eq!(request.path, ["abc123", "data.bin"]);
    assert_eq!(request.headers[USER_AGENT], "curl/7.64.1");
    Ok(())
}

#[tokio::test]
async fn download_of_missing_file_reports_status() -> Result<()> {
    let fx = Fixture::new();
    let bin = fx.bin().await;
    let dest = fx.path("missing.bin");

    let err = bin.download_file("missing.bin", Some(&dest)).await.unwrap_err();
    assert!(matches!(err, Error::TransportFailure { status: Some(404), .. }));
    assert!(err.to_string().contains("Not Found"));
    assert!(!dest.exists());
    Ok(())
}

#[tokio::test]
async fn download_into_missing_directory_fails_first() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "a.txt", "x");
    let bin = fx.bin().await;
    fx.service.clear_requests();

    let dest = fx.path("nope").join("a.txt");
    let err = bin.download_file("a.txt", Some(&dest)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDirectory(_)));
    assert_eq!(fx.service.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_decryption_removes_partial_output() -> Result<()> {
    let fx = Fixture::new();
    // 20 bytes is not a whole number of AES blocks
    fx.service.seed_file("abc123", "broken.enc", vec![0u8; 20]);
    let bin = fx.bin().await;
    let params = CipherParams::generate(CipherAlgorithm::Aes256Cbc)?;

    let err = bin
        .download_encrypted_file("broken", &params, Some(fx.dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pipeline(_)));
    assert!(!fx.path("broken").exists());
    Ok(())
}

#[tokio::test]
async fn download_stream_yields_content() -> Result<()> {
    use futures::TryStreamExt;

    let fx = Fixture::new();
    fx.service.seed_file("abc123", "a.txt", "streamed");
    let bin = fx.bin().await;

    let chunks: Vec<Bytes> = bin.download_stream("a.txt").await?.try_collect().await?;
    assert_eq!(chunks.concat(), b"streamed");
    Ok(())
}

#[tokio::test]
async fn archives_are_saved_under_default_or_given_names() -> Result<()> {
    let fx = Fixture::new();
    fx.service.seed_file("abc123", "a.txt", "1");
    let bin = fx.bin().await;

    let tar = bin
        .download_archive(ArchiveFormat::Tar, None, Some(fx.dir.path()))
        .await?;
    assert_eq!(tar, fx.path("archive.tar"));
    assert_eq!(std::fs::read(&tar)?, b"tar archive of abc123: a.txt");

    let zip = bin
        .download_archive(ArchiveFormat::Zip, Some("all.zip"), Some(fx.dir.path()))
        .await?;
    assert_eq!(zip, fx.path("all.zip"));
    let request = fx.service.requests().pop().unwrap();
    assert_eq!(request.path, ["archive", "abc123", "zip"]);
    Ok(())
}

#[tokio::test]
async fn archive_into_missing_directory_fails_first() -> Result<()> {
    let fx = Fixture::new();
    let bin = fx.bin().await;
    fx.service.clear_requests();

    let missing = fx.path("missing");
    let err = bin
        .download_archive(ArchiveFormat::Tar, None, Some(&missing))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDirectory(ref p) if p == &missing));
    assert_eq!(fx.service.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn qr_code_is_saved_as_png() -> Result<()> {
    let fx = Fixture::new();
    let bin = fx.bin().await;

    let saved = bin.save_qr_code(None, Some(fx.dir.path())).await?;
    assert_eq!(saved, fx.path("qr.png"));
    assert!(std::fs::read(&saved)?.starts_with(qr_placeholder_prefix()));

    let request = fx.service.requests().pop().unwrap();
    assert_eq!(request.path, ["qr", "abc123"]);
    assert_eq!(request.headers[ACCEPT], "image/png");
    Ok(())
}

#[tokio::test]
async fn qr_code_into_missing_directory_makes_no_request() -> Result<()> {
    let fx = Fixture::new();
    let bin = fx.bin().await;
    fx.service.clear_requests();

    let err = bin
        .save_qr_code(None, Some(Path::new("/definitely/not/here")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDirectory(_)));
    assert_eq!(fx.service.request_count(), 0);
    Ok(())
}
