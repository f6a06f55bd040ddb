use std::sync::Arc;

use filebin_core::{Error, Result, Transport, TransportRequest};
use filebin_transport_http::{HttpTransport, HttpTransportConfig};

use crate::config::ClientConfig;
use crate::session::BinSession;

/// Entry point: a transport plus the settings every session shares.
#[derive(Debug, Clone)]
pub struct Filebin {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl Filebin {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    /// Talk to the service at `config.base_url` over HTTP.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let mut http = HttpTransportConfig::new(config.base_url.clone());
        http.timeout_secs = config.timeout_secs;
        let transport = HttpTransport::create(http)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Create a bin, or attach to it if `bin_id` already exists. Without an
    /// id a fresh one is generated.
    pub async fn create_bin(&self, bin_id: Option<&str>) -> Result<BinSession> {
        let bin_id = bin_id.map_or_else(generate_bin_id, str::to_owned);
        let response = self
            .transport
            .send(TransportRequest::get([bin_id.as_str()]).accept_json())
            .await?;
        if !response.is_success() {
            return Err(Error::CreationFailed {
                status: response.status.as_u16(),
            });
        }
        let json = response.json().await?;
        tracing::debug!("created bin {bin_id}");
        BinSession::from_service_response(self.clone(), bin_id, &json)
    }

    /// Load an existing bin.
    pub async fn open_bin(&self, bin_id: &str) -> Result<BinSession> {
        let json = self.fetch_bin(bin_id).await?;
        BinSession::from_service_response(self.clone(), bin_id.to_owned(), &json)
    }

    pub(crate) async fn fetch_bin(&self, bin_id: &str) -> Result<serde_json::Value> {
        let response = self
            .transport
            .send(TransportRequest::get([bin_id]).accept_json())
            .await?;
        if !response.is_success() {
            return Err(Error::FetchFailed {
                status: response.status.as_u16(),
            });
        }
        response.json().await
    }
}

/// First 16 hex digits of a random UUID.
pub fn generate_bin_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
