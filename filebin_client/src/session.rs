use std::fmt;
use std::path::{Path, PathBuf};

use filebin_core::{
    BinMetadata, BinSnapshot, ByteStream, CipherAlgorithm, CipherParams, EncryptedUpload, Error,
    FileRecord, Pipeline, Result, Timestamp, TransportRequest, TransportResponse,
};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::Method;
use serde_json::Value;

use crate::client::Filebin;
use crate::qr;
use crate::transfer::{self, ScratchArtifact};

/// Appended to the remote name of encrypted uploads.
pub const ENCRYPTED_SUFFIX: &str = ".enc";
pub const DEFAULT_QR_FILE_NAME: &str = "qr.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Tar,
    Zip,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Tar => "archive.tar",
            Self::Zip => "archive.zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bin and the files it holds, as last reported by the service.
///
/// The file list is only changed by successful service responses: a fetch
/// replaces it, an upload adds to it, a delete removes from it.
#[derive(Debug, Clone)]
pub struct BinSession {
    client: Filebin,
    id: String,
    metadata: BinMetadata,
    files: Vec<FileRecord>,
}

impl BinSession {
    pub(crate) fn from_service_response(
        client: Filebin,
        id: String,
        json: &Value,
    ) -> Result<Self> {
        let snapshot = BinSnapshot::from_service_response(&id, json)?;
        Ok(Self {
            client,
            id,
            metadata: snapshot.metadata,
            files: snapshot.files,
        })
    }

    /// Replace every field and the whole file list with the contents of a
    /// bin response. On error the session is left untouched.
    pub fn apply_service_response(&mut self, json: &Value) -> Result<()> {
        let snapshot = BinSnapshot::from_service_response(&self.id, json)?;
        self.metadata = snapshot.metadata;
        self.files = snapshot.files;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_readonly(&self) -> bool {
        self.metadata.readonly
    }

    pub fn bytes(&self) -> u64 {
        self.metadata.bytes
    }

    pub fn bytes_readable(&self) -> &str {
        &self.metadata.bytes_readable
    }

    pub fn created(&self) -> &Timestamp {
        &self.metadata.created
    }

    pub fn updated(&self) -> &Timestamp {
        &self.metadata.updated
    }

    pub fn expired(&self) -> &Timestamp {
        &self.metadata.expired
    }

    pub fn metadata(&self) -> &BinMetadata {
        &self.metadata
    }

    /// Files in service order.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Look a file up by name, MD5 or SHA-256. The first match in list order
    /// wins.
    pub fn get_file(&self, identifier: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.matches(identifier))
    }

    pub fn file_index(&self, identifier: &str) -> Option<usize> {
        self.files.iter().position(|f| f.matches(identifier))
    }

    /// Browser URL of the bin.
    pub fn public_url(&self) -> String {
        format!(
            "{}/{}",
            self.client.transport().base_url().trim_end_matches('/'),
            self.id
        )
    }

    /// Reload the bin from the service.
    pub async fn fetch(&mut self) -> Result<()> {
        let json = self.client.fetch_bin(&self.id).await?;
        self.apply_service_response(&json)
    }

    /// Make the bin read-only. Locking a bin that is already read-only does
    /// nothing.
    pub async fn lock(&mut self) -> Result<()> {
        if self.metadata.readonly {
            return Ok(());
        }
        if self.files.is_empty() {
            return Err(Error::EmptyBin);
        }

        let request = TransportRequest::new(Method::PUT, [self.id.as_str()]).accept_json();
        let response = self.send(request).await?;
        match response.status.as_u16() {
            200..=299 => {
                self.metadata.readonly = true;
                tracing::debug!("locked bin {}", self.id);
                Ok(())
            }
            404 => Err(Error::NotFound),
            status => Err(Error::LockFailed { status }),
        }
    }

    /// Delete the bin and everything in it.
    pub async fn delete(&mut self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::EmptyBin);
        }

        let request = TransportRequest::new(Method::DELETE, [self.id.as_str()]).accept_json();
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(Error::unexpected_status(response.status));
        }
        self.files.clear();
        tracing::debug!("deleted bin {}", self.id);
        Ok(())
    }

    /// Delete one file, found as in [`get_file`](Self::get_file), and drop
    /// its record.
    pub async fn delete_file(&mut self, identifier: &str) -> Result<FileRecord> {
        let index = self
            .file_index(identifier)
            .ok_or_else(|| Error::FileNotFound(identifier.to_owned()))?;

        let filename = self.files[index].filename().to_owned();
        let request =
            TransportRequest::new(Method::DELETE, [self.id.as_str(), filename.as_str()])
                .accept_json();
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(Error::unexpected_status(response.status));
        }
        tracing::debug!("deleted {filename} from bin {}", self.id);
        Ok(self.files.remove(index))
    }

    /// Upload a local file under its own name, or under `filename` if given.
    pub async fn upload_file(
        &mut self,
        path: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> Result<FileRecord> {
        self.ensure_writable()?;
        let path = path.as_ref();
        let filename = match filename {
            Some(name) => name.to_owned(),
            None => file_name_of(path)?,
        };
        let (stream, length) =
            transfer::open_file_source(path, self.client.config().chunk_size).await?;
        self.post(&filename, stream, length).await
    }

    /// Upload `length` bytes from `stream`. The length must be exact.
    pub async fn upload_stream(
        &mut self,
        filename: &str,
        stream: ByteStream,
        length: u64,
    ) -> Result<FileRecord> {
        self.ensure_writable()?;
        self.post(filename, stream, length).await
    }

    /// Encrypt a local file and upload the ciphertext as `<name>.enc`.
    ///
    /// Without `params` a fresh AES-256-CBC key and IV are generated. The
    /// ciphertext is staged in a scratch file, which is deleted afterwards
    /// whether or not the upload succeeded.
    pub async fn upload_encrypted_file(
        &mut self,
        path: impl AsRef<Path>,
        params: Option<CipherParams>,
    ) -> Result<EncryptedUpload> {
        self.ensure_writable()?;
        let path = path.as_ref();
        let filename = format!("{}{ENCRYPTED_SUFFIX}", file_name_of(path)?);
        let params = match params {
            Some(params) => params,
            None => CipherParams::generate(CipherAlgorithm::default())?,
        };
        // fail on bad key material before touching the disk
        let encryptor = params.encryptor()?;

        let (scratch, sink) = ScratchArtifact::create(&self.client.config().scratch_dir).await?;
        let uploaded = self
            .upload_through_scratch(path, &filename, encryptor, &scratch, sink)
            .await;

        match (uploaded, scratch.release()) {
            (Ok(file), Ok(())) => Ok(EncryptedUpload { file, params }),
            (Err(e), Ok(())) => Err(e),
            (Ok(file), Err(mut cleanup)) => {
                tracing::warn!("{} uploaded but scratch cleanup failed", file.filename());
                if let Error::ScratchCleanupFailed { uploaded, .. } = &mut cleanup {
                    *uploaded = Some(Box::new(EncryptedUpload { file, params }));
                }
                Err(cleanup)
            }
            (Err(e), Err(cleanup)) => {
                tracing::error!("encrypted upload of {filename} failed: {e}");
                Err(cleanup)
            }
        }
    }

    async fn upload_through_scratch(
        &mut self,
        path: &Path,
        filename: &str,
        encryptor: filebin_core::cipher::CbcTransform,
        scratch: &ScratchArtifact,
        sink: tokio::fs::File,
    ) -> Result<FileRecord> {
        let chunk_size = self.client.config().chunk_size;
        let (source, _) = transfer::open_file_source(path, chunk_size).await?;
        Pipeline::new(source)
            .with_transform(encryptor)
            .run(sink)
            .await?;

        let (stream, length) = transfer::open_file_source(scratch.path(), chunk_size).await?;
        self.post(filename, stream, length).await
    }

    async fn post(&mut self, filename: &str, stream: ByteStream, length: u64) -> Result<FileRecord> {
        let request = TransportRequest::new(Method::POST, [self.id.as_str(), filename])
            .header(CONTENT_TYPE, "application/octet-stream")
            .accept_json()
            .body(stream, length);
        let response = self.send(request).await?;
        match response.status.as_u16() {
            200..=299 => {}
            405 => return Err(Error::BinLocked),
            403 => return Err(Error::StorageLimitReached),
            400 => return Err(Error::InvalidInput),
            _ => return Err(Error::unexpected_status(response.status)),
        }

        let record = FileRecord::from_upload_response(&self.id, &response.json().await?)?;
        tracing::debug!(
            "uploaded {} ({} bytes) to bin {}",
            record.filename(),
            record.bytes(),
            self.id
        );
        // names are unique within a bin, so a re-upload replaces in place
        match self.files.iter().position(|f| f.filename() == record.filename()) {
            Some(index) => self.files[index] = record.clone(),
            None => self.files.push(record.clone()),
        }
        Ok(record)
    }

    /// Stream a file's content.
    pub async fn download_stream(&self, filename: &str) -> Result<ByteStream> {
        let user_agent = self.user_agent()?;
        let request = TransportRequest::get([self.id.as_str(), filename])
            .header_value(USER_AGENT, user_agent);
        let response = self.send(request).await?;
        expect_success(response).map(TransportResponse::into_stream)
    }

    /// Save a file to `dest`, by default `./<filename>`.
    pub async fn download_file(&self, filename: &str, dest: Option<&Path>) -> Result<PathBuf> {
        let dest = dest.map_or_else(|| Path::new(".").join(filename), Path::to_path_buf);
        transfer::ensure_dir(transfer::parent_dir(&dest)).await?;

        let stream = self.download_stream(filename).await?;
        let written = transfer::write_file(Pipeline::new(stream), &dest).await?;
        tracing::debug!("downloaded {filename} ({written} bytes) to {}", dest.display());
        Ok(dest)
    }

    /// Download `<name>.enc` and decrypt it into `dir` (default `.`) as
    /// `<name>`. `filename` may be given with or without the suffix.
    pub async fn download_encrypted_file(
        &self,
        filename: &str,
        params: &CipherParams,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let plain = filename.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(filename);
        let dir = dir.unwrap_or(Path::new("."));
        transfer::ensure_dir(dir).await?;
        let decryptor = params.decryptor()?;

        let stream = self
            .download_stream(&format!("{plain}{ENCRYPTED_SUFFIX}"))
            .await?;
        let dest = dir.join(plain);
        transfer::write_file(Pipeline::new(stream).with_transform(decryptor), &dest).await?;
        Ok(dest)
    }

    /// Stream the whole bin as an archive.
    pub async fn archive_stream(&self, format: ArchiveFormat) -> Result<ByteStream> {
        let user_agent = self.user_agent()?;
        let request = TransportRequest::get(["archive", self.id.as_str(), format.as_str()])
            .header_value(USER_AGENT, user_agent);
        let response = self.send(request).await?;
        expect_success(response).map(TransportResponse::into_stream)
    }

    /// Save the whole bin as an archive in `dir` (default `.`), named
    /// `archive.tar` or `archive.zip` unless `file_name` is given.
    pub async fn download_archive(
        &self,
        format: ArchiveFormat,
        file_name: Option<&str>,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let dir = dir.unwrap_or(Path::new("."));
        transfer::ensure_dir(dir).await?;
        let dest = dir.join(file_name.unwrap_or(format.default_file_name()));

        let stream = self.archive_stream(format).await?;
        transfer::write_file(Pipeline::new(stream), &dest).await?;
        Ok(dest)
    }

    /// The service's PNG QR code for this bin.
    pub async fn qr_code_stream(&self) -> Result<ByteStream> {
        let request =
            TransportRequest::get(["qr", self.id.as_str()]).header(ACCEPT, "image/png");
        let response = self.send(request).await?;
        expect_success(response).map(TransportResponse::into_stream)
    }

    /// Save the service's QR code PNG in `dir` (default `.`) as `qr.png`
    /// unless `file_name` is given.
    pub async fn save_qr_code(
        &self,
        file_name: Option<&str>,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let dir = dir.unwrap_or(Path::new("."));
        transfer::ensure_dir(dir).await?;
        let dest = dir.join(file_name.unwrap_or(DEFAULT_QR_FILE_NAME));

        let stream = self.qr_code_stream().await?;
        transfer::write_file(Pipeline::new(stream), &dest).await?;
        Ok(dest)
    }

    /// QR code of [`public_url`](Self::public_url) as terminal text. Built
    /// locally, no request is made.
    pub fn render_qr_code(&self) -> Result<String> {
        qr::render_terminal(&self.public_url())
    }

    /// Print [`render_qr_code`](Self::render_qr_code) to stdout.
    pub fn show_qr_code(&self) -> Result<()> {
        println!("{}", self.render_qr_code()?);
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.metadata.readonly {
            return Err(Error::BinLocked);
        }
        Ok(())
    }

    fn user_agent(&self) -> Result<HeaderValue> {
        let agent = &self.client.config().user_agent;
        HeaderValue::from_str(agent)
            .map_err(|_| Error::Config(format!("invalid user agent {agent:?}")))
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        tracing::debug!("{} {}", request.method, request.display_path());
        self.client.transport().send(request).await
    }
}

fn expect_success(response: TransportResponse) -> Result<TransportResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Error::unexpected_status(response.status))
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or(Error::InvalidInput)
}
