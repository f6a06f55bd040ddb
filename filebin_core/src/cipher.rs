//! Client-side encryption for file transfers.
//!
//! Files are encrypted with AES in CBC mode and PKCS#7 padding before they
//! leave the client. The transform works block by block, so it can sit in
//! the middle of a [`Pipeline`](crate::pipeline::Pipeline) without ever
//! holding more than one chunk plus one block in memory.

use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use bytes::Bytes;
use cbc::cipher::block_padding::{Padding, Pkcs7};
use cbc::cipher::consts::U16;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Transform;

/// AES block size in bytes. CBC ciphertext is always a whole number of blocks.
pub const BLOCK_SIZE: usize = 16;

/// Length of the initialization vector in bytes.
pub const IV_LEN: usize = 16;

type Block = GenericArray<u8, U16>;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("unsupported cipher algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid key length for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        algorithm: CipherAlgorithm,
        expected: usize,
        actual: usize,
    },
    #[error("invalid IV length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),
    #[error("ciphertext is not a whole number of blocks")]
    InvalidCiphertextLength,
    #[error("invalid padding: wrong key or corrupted ciphertext")]
    BadPadding,
    #[error("random number generation failed")]
    RngFailed,
}

/// Block cipher selection, named the way OpenSSL names them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[serde(rename = "aes-128-cbc")]
    Aes128Cbc,
    #[serde(rename = "aes-192-cbc")]
    Aes192Cbc,
    #[default]
    #[serde(rename = "aes-256-cbc")]
    Aes256Cbc,
}

impl CipherAlgorithm {
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "aes-128-cbc",
            Self::Aes192Cbc => "aes-192-cbc",
            Self::Aes256Cbc => "aes-256-cbc",
        }
    }

    /// Exact ciphertext length for a plaintext of `plaintext_len` bytes.
    ///
    /// PKCS#7 always appends between 1 and 16 bytes, so a block-aligned
    /// plaintext grows by a full block.
    pub fn ciphertext_len(self, plaintext_len: u64) -> u64 {
        (plaintext_len / BLOCK_SIZE as u64 + 1) * BLOCK_SIZE as u64
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-128-cbc" => Ok(Self::Aes128Cbc),
            "aes-192-cbc" => Ok(Self::Aes192Cbc),
            "aes-256-cbc" => Ok(Self::Aes256Cbc),
            _ => Err(CipherError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// Algorithm, key and IV for one encrypted transfer.
///
/// The client never keeps these around: they are handed back to the caller
/// after an encrypted upload and must be supplied again to decrypt.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherParams {
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
    iv: [u8; IV_LEN],
}

impl CipherParams {
    /// Build params from caller-supplied key material.
    pub fn new(
        algorithm: CipherAlgorithm,
        key: impl Into<Vec<u8>>,
        iv: &[u8],
    ) -> Result<Self, CipherError> {
        let key = key.into();
        if key.len() != algorithm.key_len() {
            return Err(CipherError::InvalidKeyLength {
                algorithm,
                expected: algorithm.key_len(),
                actual: key.len(),
            });
        }
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv.len()))?;
        Ok(Self { algorithm, key, iv })
    }

    /// Draw a fresh key and an independent fresh IV from the OS RNG.
    pub fn generate(algorithm: CipherAlgorithm) -> Result<Self, CipherError> {
        let mut key = vec![0u8; algorithm.key_len()];
        getrandom::fill(&mut key).map_err(|_| CipherError::RngFailed)?;
        let mut iv = [0u8; IV_LEN];
        getrandom::fill(&mut iv).map_err(|_| CipherError::RngFailed)?;
        Ok(Self { algorithm, key, iv })
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn encryptor(&self) -> Result<CbcTransform, CipherError> {
        Ok(CbcTransform {
            mode: Mode::Encrypt(BlockEncryptor::new(self)?),
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    pub fn decryptor(&self) -> Result<CbcTransform, CipherError> {
        Ok(CbcTransform {
            mode: Mode::Decrypt(BlockDecryptor::new(self)?),
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }
}

impl fmt::Debug for CipherParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherParams")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

enum BlockEncryptor {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl BlockEncryptor {
    fn new(params: &CipherParams) -> Result<Self, CipherError> {
        let invalid = |_| CipherError::InvalidKeyLength {
            algorithm: params.algorithm,
            expected: params.algorithm.key_len(),
            actual: params.key.len(),
        };
        Ok(match params.algorithm {
            CipherAlgorithm::Aes128Cbc => {
                Self::Aes128(cbc::Encryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes192Cbc => {
                Self::Aes192(cbc::Encryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes256Cbc => {
                Self::Aes256(cbc::Encryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
        })
    }

    fn encrypt(&mut self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block_mut(block),
            Self::Aes192(c) => c.encrypt_block_mut(block),
            Self::Aes256(c) => c.encrypt_block_mut(block),
        }
    }
}

enum BlockDecryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl BlockDecryptor {
    fn new(params: &CipherParams) -> Result<Self, CipherError> {
        let invalid = |_| CipherError::InvalidKeyLength {
            algorithm: params.algorithm,
            expected: params.algorithm.key_len(),
            actual: params.key.len(),
        };
        Ok(match params.algorithm {
            CipherAlgorithm::Aes128Cbc => {
                Self::Aes128(cbc::Decryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes192Cbc => {
                Self::Aes192(cbc::Decryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes256Cbc => {
                Self::Aes256(cbc::Decryptor::new_from_slices(&params.key, &params.iv).map_err(invalid)?)
            }
        })
    }

    fn decrypt(&mut self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.decrypt_block_mut(block),
            Self::Aes192(c) => c.decrypt_block_mut(block),
            Self::Aes256(c) => c.decrypt_block_mut(block),
        }
    }
}

enum Mode {
    Encrypt(BlockEncryptor),
    Decrypt(BlockDecryptor),
}

/// Streaming CBC encryptor or decryptor.
///
/// Input is buffered only up to the next block boundary. When decrypting,
/// the last complete block is held back until [`Transform::finish`] because
/// it carries the padding.
pub struct CbcTransform {
    mode: Mode,
    pending: Vec<u8>,
}

impl CbcTransform {
    fn process(&mut self, len: usize) -> Bytes {
        let mut out: Vec<u8> = self.pending.drain(..len).collect();
        for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
            let block = Block::from_mut_slice(chunk);
            match &mut self.mode {
                Mode::Encrypt(c) => c.encrypt(block),
                Mode::Decrypt(c) => c.decrypt(block),
            }
        }
        Bytes::from(out)
    }

    fn finish_inner(&mut self) -> Result<Bytes, CipherError> {
        match &mut self.mode {
            Mode::Encrypt(c) => {
                let mut block = Block::default();
                let pos = self.pending.len();
                block[..pos].copy_from_slice(&self.pending);
                <Pkcs7 as Padding<U16>>::pad(&mut block, pos);
                self.pending.clear();
                c.encrypt(&mut block);
                Ok(Bytes::copy_from_slice(&block))
            }
            Mode::Decrypt(c) => {
                if self.pending.len() != BLOCK_SIZE {
                    return Err(CipherError::InvalidCiphertextLength);
                }
                let mut block = Block::clone_from_slice(&self.pending);
                self.pending.clear();
                c.decrypt(&mut block);
                let plain = <Pkcs7 as Padding<U16>>::unpad(&block)
                    .map_err(|_| CipherError::BadPadding)?;
                Ok(Bytes::copy_from_slice(plain))
            }
        }
    }
}

impl Transform for CbcTransform {
    fn update(&mut self, input: &[u8]) -> std::io::Result<Bytes> {
        self.pending.extend_from_slice(input);
        let ready = match self.mode {
            Mode::Encrypt(_) => self.pending.len() / BLOCK_SIZE * BLOCK_SIZE,
            // keep the final block back for unpadding
            Mode::Decrypt(_) => self.pending.len().saturating_sub(1) / BLOCK_SIZE * BLOCK_SIZE,
        };
        if ready == 0 {
            return Ok(Bytes::new());
        }
        Ok(self.process(ready))
    }

    fn finish(&mut self) -> std::io::Result<Bytes> {
        self.finish_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
