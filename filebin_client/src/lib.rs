//! Client for filebin.net-style ephemeral file bins.
//!
//! [`Filebin`] creates and opens bins; each one is handled through a
//! [`BinSession`], which keeps the bin's file list in step with the service
//! as files are uploaded, downloaded and deleted. Uploads can be encrypted
//! client side with AES-CBC, see [`BinSession::upload_encrypted_file`].
//!
//! ```no_run
//! # async fn demo() -> filebin_client::Result<()> {
//! use filebin_client::{ClientConfig, Filebin};
//!
//! let client = Filebin::connect(ClientConfig::default())?;
//! let mut bin = client.create_bin(None).await?;
//! bin.upload_file("report.pdf", None).await?;
//! bin.lock().await?;
//! println!("{}", bin.public_url());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod qr;
mod session;
mod transfer;

pub use client::{Filebin, generate_bin_id};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE};
pub use qr::render_terminal as render_qr;
pub use session::{ArchiveFormat, BinSession, DEFAULT_QR_FILE_NAME, ENCRYPTED_SUFFIX};

pub use filebin_core::{
    BinMetadata, ByteStream, CipherAlgorithm, CipherError, CipherParams, EncryptedUpload, Error,
    FileRecord, Result, Timestamp, Transport,
};
