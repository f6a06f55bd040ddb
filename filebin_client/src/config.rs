use std::path::{Path, PathBuf};

use filebin_core::{DOWNLOAD_USER_AGENT, Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://filebin.net";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Client settings, usually read from a TOML file. Every field has a
/// default, so an empty document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent with binary downloads.
    pub user_agent: String,
    /// Where encrypted uploads stage their ciphertext. Created on demand.
    pub scratch_dir: PathBuf,
    pub timeout_secs: Option<u64>,
    /// Read buffer size for local file sources.
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DOWNLOAD_USER_AGENT.to_owned(),
            scratch_dir: std::env::temp_dir().join("filebin-scratch"),
            timeout_secs: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let toml_content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&toml_content)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if http::HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(Error::Config(format!(
                "user_agent {:?} is not a valid header value",
                self.user_agent
            )));
        }
        Ok(())
    }
}
