//! Bin and file records as reported by the service.
//!
//! Records are only ever built from a successful service response. They are
//! plain values afterwards: no setters, no partially filled states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::CipherParams;
use crate::error::{Error, Result};

/// An absolute instant together with the service's relative phrasing of it
/// ("3 minutes ago", "in 6 days").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub at: DateTime<Utc>,
    pub relative: String,
}

/// One file stored in a bin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    bin_id: String,
    filename: String,
    content_type: String,
    bytes: u64,
    bytes_readable: String,
    md5: String,
    sha256: String,
    updated: Timestamp,
    created: Timestamp,
}

impl FileRecord {
    /// Parse the `{ "file": { ... } }` body returned by an upload.
    pub fn from_upload_response(bin_id: &str, json: &Value) -> Result<Self> {
        let response = UploadResponse::deserialize(json).map_err(malformed)?;
        Ok(Self::from_wire(bin_id, response.file))
    }

    fn from_wire(bin_id: &str, wire: FileWire) -> Self {
        Self {
            bin_id: bin_id.to_owned(),
            filename: wire.filename,
            content_type: wire.content_type,
            bytes: wire.bytes,
            bytes_readable: wire.bytes_readable,
            md5: wire.md5,
            sha256: wire.sha256,
            updated: Timestamp {
                at: wire.updated_at,
                relative: wire.updated_at_relative,
            },
            created: Timestamp {
                at: wire.created_at,
                relative: wire.created_at_relative,
            },
        }
    }

    /// True if `identifier` is this file's name, MD5 or SHA-256.
    pub fn matches(&self, identifier: &str) -> bool {
        self.filename == identifier || self.md5 == identifier || self.sha256 == identifier
    }

    pub fn bin_id(&self) -> &str {
        &self.bin_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn bytes_readable(&self) -> &str {
        &self.bytes_readable
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn updated(&self) -> &Timestamp {
        &self.updated
    }

    pub fn created(&self) -> &Timestamp {
        &self.created
    }
}

/// Bin-level metadata from the `bin` object of a bin response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinMetadata {
    pub readonly: bool,
    pub bytes: u64,
    pub bytes_readable: String,
    pub updated: Timestamp,
    pub created: Timestamp,
    pub expired: Timestamp,
}

/// Everything a `GET /{bin}` response says about a bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinSnapshot {
    pub metadata: BinMetadata,
    /// In the order the service listed them.
    pub files: Vec<FileRecord>,
}

impl BinSnapshot {
    /// Parse a bin response. An absent or `null` `files` field is an empty bin.
    pub fn from_service_response(bin_id: &str, json: &Value) -> Result<Self> {
        let response = BinResponse::deserialize(json).map_err(malformed)?;
        let bin = response.bin;
        Ok(Self {
            metadata: BinMetadata {
                readonly: bin.readonly,
                bytes: bin.bytes,
                bytes_readable: bin.bytes_readable,
                updated: Timestamp {
                    at: bin.updated_at,
                    relative: bin.updated_at_relative,
                },
                created: Timestamp {
                    at: bin.created_at,
                    relative: bin.created_at_relative,
                },
                expired: Timestamp {
                    at: bin.expired_at,
                    relative: bin.expired_at_relative,
                },
            },
            files: response
                .files
                .unwrap_or_default()
                .into_iter()
                .map(|f| FileRecord::from_wire(bin_id, f))
                .collect(),
        })
    }
}

fn malformed(e: serde_json::Error) -> Error {
    Error::MalformedResponse(e.to_string())
}

// Wire format

#[derive(Deserialize)]
struct BinResponse {
    bin: BinWire,
    #[serde(default)]
    files: Option<Vec<FileWire>>,
}

#[derive(Deserialize)]
struct BinWire {
    readonly: bool,
    bytes: u64,
    bytes_readable: String,
    updated_at: DateTime<Utc>,
    updated_at_relative: String,
    created_at: DateTime<Utc>,
    created_at_relative: String,
    expired_at: DateTime<Utc>,
    expired_at_relative: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileWire,
}

#[derive(Deserialize)]
struct FileWire {
    filename: String,
    #[serde(rename = "content-type")]
    content_type: String,
    bytes: u64,
    bytes_readable: String,
    md5: String,
    sha256: String,
    updated_at: DateTime<Utc>,
    updated_at_relative: String,
    created_at: DateTime<Utc>,
    created_at_relative: String,
}

/// An uploaded ciphertext and the parameters that decrypt it. Keep
/// `params`: the service only ever sees ciphertext.
#[derive(Debug, Clone)]
pub struct EncryptedUpload {
    pub file: FileRecord,
    pub params: CipherParams,
}
