//! An in-process stand-in for a filebin service.
//!
//! [`MemoryService`] implements [`Transport`] by answering requests from
//! in-memory state, with the same status codes the real service uses. Every
//! request is recorded so tests can assert on what was (or was not) sent.

mod state;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use filebin_core::{
    ByteStream, Error, RequestBody, ResponseBody, Result, Transport, TransportRequest,
    TransportResponse,
};
use futures::stream::{self, TryStreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde_json::{Value, json};

use state::{StoredBin, StoredFile};

pub const DEFAULT_BASE_URL: &str = "https://filebin.test";
pub const DEFAULT_STORAGE_LIMIT: u64 = 1 << 30;

/// A request as the service received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: Vec<String>,
    pub headers: HeaderMap,
    /// Declared body length, if the request carried a body.
    pub body_len: Option<u64>,
}

#[derive(Debug)]
pub struct MemoryService {
    base_url: String,
    bins: DashMap<String, StoredBin>,
    requests: Mutex<Vec<RecordedRequest>>,
    offline: AtomicBool,
    storage_limit: AtomicU64,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bins: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            storage_limit: AtomicU64::new(DEFAULT_STORAGE_LIMIT),
        }
    }

    /// Total bytes the service accepts across all bins before answering
    /// uploads with 403.
    pub fn set_storage_limit(&self, bytes: u64) {
        self.storage_limit.store(bytes, Ordering::SeqCst);
    }

    /// While offline every request fails as if the connection was refused.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log().len()
    }

    pub fn clear_requests(&self) {
        self.log().clear();
    }

    /// Store a file directly, creating the bin if needed. Not recorded as a
    /// request.
    pub fn seed_file(&self, bin: &str, filename: &str, data: impl Into<Bytes>) {
        let now = Utc::now();
        let file = StoredFile::new(filename, "application/octet-stream", data.into(), now);
        self.bins
            .entry(bin.to_owned())
            .or_insert_with(|| StoredBin::new(now))
            .put(file);
    }

    /// Mark a bin read-only (or writable again) without a request.
    pub fn set_readonly(&self, bin: &str, readonly: bool) {
        if let Some(mut stored) = self.bins.get_mut(bin) {
            stored.readonly = readonly;
        }
    }

    pub fn bin_exists(&self, bin: &str) -> bool {
        self.bins.contains_key(bin)
    }

    pub fn is_readonly(&self, bin: &str) -> Option<bool> {
        self.bins.get(bin).map(|b| b.readonly)
    }

    pub fn file_data(&self, bin: &str, filename: &str) -> Option<Bytes> {
        self.bins
            .get(bin)
            .and_then(|b| b.file(filename).map(|f| f.data.clone()))
    }

    /// Filenames in service order.
    pub fn file_names(&self, bin: &str) -> Vec<String> {
        self.bins
            .get(bin)
            .map(|b| b.files.iter().map(|f| f.filename.clone()).collect())
            .unwrap_or_default()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, request: &TransportRequest) {
        let body_len = match &request.body {
            RequestBody::Empty => None,
            RequestBody::Stream { length, .. } => Some(*length),
        };
        self.log().push(RecordedRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
            body_len,
        });
    }

    fn stored_bytes(&self) -> u64 {
        self.bins.iter().map(|b| b.bytes()).sum()
    }

    fn get_bin(&self, bin: &str) -> TransportResponse {
        let now = Utc::now();
        let stored = self
            .bins
            .entry(bin.to_owned())
            .or_insert_with(|| StoredBin::new(now));
        json_response(StatusCode::OK, stored.response_json(bin, now))
    }

    fn lock_bin(&self, bin: &str) -> TransportResponse {
        match self.bins.get_mut(bin) {
            Some(mut stored) => {
                stored.readonly = true;
                stored.updated_at = Utc::now();
                text(StatusCode::OK, "bin locked")
            }
            None => text(StatusCode::NOT_FOUND, "bin not found"),
        }
    }

    fn delete_bin(&self, bin: &str) -> TransportResponse {
        match self.bins.remove(bin) {
            Some(_) => text(StatusCode::OK, "bin deleted"),
            None => text(StatusCode::NOT_FOUND, "bin not found"),
        }
    }

    async fn upload(
        &self,
        bin: &str,
        filename: &str,
        headers: &HeaderMap,
        body: RequestBody,
    ) -> Result<TransportResponse> {
        if filename.is_empty() || filename.contains('/') {
            return Ok(text(StatusCode::BAD_REQUEST, "invalid filename"));
        }
        if self.bins.get(bin).is_some_and(|b| b.readonly) {
            return Ok(text(StatusCode::METHOD_NOT_ALLOWED, "bin is locked"));
        }
        let RequestBody::Stream { stream, length } = body else {
            return Ok(text(StatusCode::BAD_REQUEST, "missing request body"));
        };

        let chunks: Vec<Bytes> = stream
            .try_collect()
            .await
            .map_err(|e| Error::transport("failed to send request body", e))?;
        let data = Bytes::from(chunks.concat());
        if data.len() as u64 != length {
            return Ok(text(StatusCode::BAD_REQUEST, "content length mismatch"));
        }

        let replaced = self
            .bins
            .get(bin)
            .and_then(|b| b.file(filename).map(|f| f.data.len() as u64))
            .unwrap_or(0);
        let limit = self.storage_limit.load(Ordering::SeqCst);
        if self.stored_bytes() - replaced + length > limit {
            return Ok(text(StatusCode::FORBIDDEN, "storage limit reached"));
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream");
        let now = Utc::now();
        let file = StoredFile::new(filename, content_type, data, now);
        let file_json = file.file_json(now);

        let mut stored = self
            .bins
            .entry(bin.to_owned())
            .or_insert_with(|| StoredBin::new(now));
        stored.put(file);
        let body = json!({
            "bin": stored.bin_json(bin, now),
            "file": file_json,
        });
        Ok(json_response(StatusCode::CREATED, body))
    }

    fn download(&self, bin: &str, filename: &str) -> TransportResponse {
        let Some(file) = self
            .bins
            .get(bin)
            .and_then(|b| b.file(filename).cloned())
        else {
            return text(StatusCode::NOT_FOUND, "file not found");
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(file.data.len() as u64));
        if let Ok(value) = HeaderValue::from_str(&file.content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        binary(StatusCode::OK, headers, file.data)
    }

    fn delete_file(&self, bin: &str, filename: &str) -> TransportResponse {
        let removed = self
            .bins
            .get_mut(bin)
            .is_some_and(|mut b| b.remove(filename, Utc::now()));
        if removed {
            text(StatusCode::OK, "file deleted")
        } else {
            text(StatusCode::NOT_FOUND, "file not found")
        }
    }

    /// Placeholder archive: a one-line manifest instead of real tar or zip
    /// framing.
    fn archive(&self, bin: &str, format: &str) -> TransportResponse {
        let content_type = match format {
            "tar" => "application/x-tar",
            "zip" => "application/zip",
            _ => return text(StatusCode::NOT_FOUND, "unknown archive format"),
        };
        let Some(stored) = self.bins.get(bin) else {
            return text(StatusCode::NOT_FOUND, "bin not found");
        };
        let names: Vec<&str> = stored.files.iter().map(|f| f.filename.as_str()).collect();
        let body = Bytes::from(format!("{format} archive of {bin}: {}", names.join(",")));
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        binary(StatusCode::OK, headers, body)
    }

    /// Placeholder PNG: the signature followed by the bin id.
    fn qr(&self, bin: &str) -> TransportResponse {
        let mut body = qr_placeholder_prefix().to_vec();
        body.extend_from_slice(bin.as_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        binary(StatusCode::OK, headers, Bytes::from(body))
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

/// First bytes of every QR body the service returns.
pub fn qr_placeholder_prefix() -> &'static [u8] {
    b"\x89PNG\r\n\x1a\n"
}

#[async_trait::async_trait]
impl Transport for MemoryService {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.record(&request);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport(
                "service unreachable",
                io::Error::new(io::ErrorKind::ConnectionRefused, "memory service is offline"),
            ));
        }

        let TransportRequest {
            method,
            path,
            headers,
            body,
        } = request;
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let response = match (method.as_str(), segments.as_slice()) {
            ("GET", ["archive", bin, format]) => self.archive(bin, format),
            ("GET", ["qr", bin]) => self.qr(bin),
            ("GET", [bin]) => self.get_bin(bin),
            ("PUT", [bin]) => self.lock_bin(bin),
            ("DELETE", [bin]) => self.delete_bin(bin),
            ("POST", [bin, filename]) => self.upload(bin, filename, &headers, body).await?,
            ("GET", [bin, filename]) => self.download(bin, filename),
            ("DELETE", [bin, filename]) => self.delete_file(bin, filename),
            _ => text(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn json_response(status: StatusCode, body: Value) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    TransportResponse {
        status,
        headers,
        body: ResponseBody::Json(body),
    }
}

fn text(status: StatusCode, message: &'static str) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    binary(status, headers, Bytes::from_static(message.as_bytes()))
}

fn binary(status: StatusCode, headers: HeaderMap, data: Bytes) -> TransportResponse {
    let stream: ByteStream = Box::new(stream::iter([Ok::<_, io::Error>(data)]));
    TransportResponse {
        status,
        headers,
        body: ResponseBody::Stream(stream),
    }
}
