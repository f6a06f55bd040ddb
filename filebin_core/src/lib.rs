//! Core types and traits shared by the filebin crates.
//!
//! - Bin and file records parsed from service responses ([`model`])
//! - The error taxonomy every operation reports through ([`Error`])
//! - The [`Transport`] trait that HTTP and in-memory backends implement
//! - The staged transfer [`Pipeline`] and the AES-CBC [`cipher`] transform
//!   that can be placed in it

pub mod cipher;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod transport;

// Test fixtures (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use cipher::{CipherAlgorithm, CipherError, CipherParams};
pub use error::{Error, Result};
pub use model::{BinMetadata, BinSnapshot, EncryptedUpload, FileRecord, Timestamp};
pub use pipeline::{ByteStream, Pipeline, PipelineError, Stage, Transform};
pub use transport::{
    DOWNLOAD_USER_AGENT, RequestBody, ResponseBody, Transport, TransportRequest,
    TransportResponse,
};
