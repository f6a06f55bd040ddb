use std::time::Duration;

use async_trait::async_trait;
use filebin_core::transport::{RequestBody, ResponseBody};
use filebin_core::{Error, Result, Transport, TransportRequest, TransportResponse};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_LENGTH;
use url::Url;

use crate::config::HttpTransportConfig;

/// [`Transport`] speaking plain HTTP(S) to a filebin-compatible service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    base_url_str: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn create(config: HttpTransportConfig) -> Result<Self> {
        let trimmed = config.base_url.trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| Error::Config(format!("invalid base url {trimmed:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("{trimmed:?} cannot be a base url")));
        }

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport("failed to build http client", e))?;

        Ok(Self {
            base_url,
            base_url_str: trimmed.to_owned(),
            client,
        })
    }

    /// Full URL for a request path. Each segment is percent-encoded on its
    /// own, so a filename containing `?` or `#` stays a single segment.
    pub fn url_for(&self, path: &[String]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self.url_for(&request.path);
        log::debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method, url.clone())
            .headers(request.headers);
        if let RequestBody::Stream { stream, length } = request.body {
            builder = builder
                .header(CONTENT_LENGTH, length)
                .body(reqwest::Body::wrap_stream(stream));
        }

        let res = builder
            .send()
            .await
            .map_err(|e| Error::transport(format!("request to {url} failed"), e))?;

        let status = res.status();
        let headers = res.headers().clone();
        log::debug!("{url} -> {status}");

        // always streamed; callers that want JSON parse it with `json()`
        let stream = res.bytes_stream().map_err(std::io::Error::other).boxed();

        Ok(TransportResponse {
            status,
            headers,
            body: ResponseBody::Stream(Box::new(stream)),
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url_str
    }
}
