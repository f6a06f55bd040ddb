//! JSON fixtures shaped like the service's responses.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! filebin_core = { workspace = true, features = ["testutil"] }
//! ```

use serde_json::{Value, json};

const AT: &str = "2024-05-01T10:00:00Z";

/// A `files[]` entry. Digests are derived from the name so lookups by
/// digest are predictable in tests.
pub fn file_json(filename: &str, bytes: u64) -> Value {
    json!({
        "filename": filename,
        "content-type": "application/octet-stream",
        "bytes": bytes,
        "bytes_readable": format!("{bytes} B"),
        "md5": md5_of(filename),
        "sha256": sha256_of(filename),
        "updated_at": AT,
        "updated_at_relative": "just now",
        "created_at": AT,
        "created_at_relative": "just now",
    })
}

/// A full `GET /{bin}` body.
pub fn bin_json(readonly: bool, files: Vec<Value>) -> Value {
    let bytes: u64 = files
        .iter()
        .filter_map(|f| f["bytes"].as_u64())
        .sum();
    json!({
        "bin": {
            "readonly": readonly,
            "bytes": bytes,
            "bytes_readable": format!("{bytes} B"),
            "updated_at": AT,
            "updated_at_relative": "just now",
            "created_at": AT,
            "created_at_relative": "just now",
            "expired_at": "2024-05-07T10:00:00Z",
            "expired_at_relative": "in 6 days",
        },
        "files": files,
    })
}

/// An upload response body wrapping `file_json`.
pub fn upload_json(filename: &str, bytes: u64) -> Value {
    json!({ "file": file_json(filename, bytes) })
}

pub fn md5_of(filename: &str) -> String {
    format!("md5-{filename}")
}

pub fn sha256_of(filename: &str) -> String {
    format!("sha256-{filename}")
}
