use std::path::PathBuf;

use thiserror::Error;

use crate::cipher::CipherError;
use crate::model::EncryptedUpload;
use crate::pipeline::PipelineError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure a bin or file operation can surface.
///
/// Status codes are interpreted per operation, so the same HTTP status can
/// land in different variants depending on which call produced it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to create bin (HTTP {status})")]
    CreationFailed { status: u16 },

    #[error("failed to load bin (HTTP {status})")]
    FetchFailed { status: u16 },

    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    #[error("bin has no files")]
    EmptyBin,

    #[error("bin is locked")]
    BinLocked,

    #[error("storage limit reached")]
    StorageLimitReached,

    #[error("invalid input")]
    InvalidInput,

    #[error("bin does not exist")]
    NotFound,

    #[error("failed to lock bin (HTTP {status})")]
    LockFailed { status: u16 },

    #[error("no file matching '{0}' in bin")]
    FileNotFound(String),

    #[error("transport failure{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    TransportFailure {
        status: Option<u16>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    /// The scratch file outlived the call. If the upload itself went
    /// through, `uploaded` holds the record and the key material.
    #[error("scratch artifact {} could not be deleted", .path.display())]
    ScratchCleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        uploaded: Option<Box<EncryptedUpload>>,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("QR code generation failed: {0}")]
    QrCode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A non-2xx outcome with no operation-specific meaning.
    pub fn unexpected_status(status: http::StatusCode) -> Self {
        Self::TransportFailure {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_owned(),
            source: None,
        }
    }

    /// A network-level failure: nothing came back from the service.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportFailure {
            status: None,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status attached to the error, if the service produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CreationFailed { status }
            | Self::FetchFailed { status }
            | Self::LockFailed { status } => Some(*status),
            Self::TransportFailure { status, .. } => *status,
            _ => None,
        }
    }

    /// Upload that completed despite this error, so its key is not lost.
    pub fn uploaded(&self) -> Option<&EncryptedUpload> {
        match self {
            Self::ScratchCleanupFailed { uploaded, .. } => uploaded.as_deref(),
            _ => None,
        }
    }
}
