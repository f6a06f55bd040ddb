use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::pipeline::ByteStream;

/// Fixed user agent for binary downloads; the service serves raw file
/// content to curl and an HTML landing page to browsers.
pub const DOWNLOAD_USER_AGENT: &str = "curl/7.64.1";

/// Issues one request against the file-bin service.
///
/// Implementations never retry and never interpret status codes; a non-2xx
/// response is returned as a normal [`TransportResponse`]. Only failures
/// where no response arrived at all become [`Error::TransportFailure`].
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Public root of the service, e.g. `https://filebin.net`.
    fn base_url(&self) -> &str;
}

pub enum RequestBody {
    Empty,
    /// Streamed body with an exact, known length.
    Stream { stream: ByteStream, length: u64 },
}

pub struct TransportRequest {
    pub method: Method,
    /// Unencoded path segments below the service root.
    pub path: Vec<String>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::GET, path)
    }

    pub fn header(self, name: HeaderName, value: &'static str) -> Self {
        self.header_value(name, HeaderValue::from_static(value))
    }

    pub fn header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn accept_json(self) -> Self {
        self.header(http::header::ACCEPT, "application/json")
    }

    pub fn body(mut self, stream: ByteStream, length: u64) -> Self {
        self.body = RequestBody::Stream { stream, length };
        self
    }

    /// `/a/b/c` form of the path, for logging.
    pub fn display_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

pub enum ResponseBody {
    /// Already-parsed JSON, for in-process transports. Network transports
    /// always stream so that downloaded files keep their exact bytes.
    Json(Value),
    Stream(ByteStream),
}

pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as JSON, reading and parsing a streamed body in full.
    pub async fn json(self) -> Result<Value> {
        match self.body {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream
                    .try_collect()
                    .await
                    .map_err(|e| Error::transport("failed to read response body", e))?;
                serde_json::from_slice(&chunks.concat())
                    .map_err(|e| Error::MalformedResponse(e.to_string()))
            }
        }
    }

    pub fn into_stream(self) -> ByteStream {
        match self.body {
            ResponseBody::Stream(stream) => stream,
            ResponseBody::Json(value) => {
                let bytes = Bytes::from(value.to_string());
                Box::new(futures::stream::iter([Ok::<_, std::io::Error>(bytes)]))
            }
        }
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
