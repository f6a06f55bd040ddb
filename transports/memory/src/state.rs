use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use md5::Md5;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Bins expire this long after they were created.
pub(crate) const EXPIRY_DAYS: i64 = 6;

#[derive(Debug, Clone)]
pub(crate) struct StoredBin {
    pub readonly: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub files: Vec<StoredFile>,
}

impl StoredBin {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            readonly: false,
            created_at: now,
            updated_at: now,
            files: Vec::new(),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }

    pub fn file(&self, filename: &str) -> Option<&StoredFile> {
        self.files.iter().find(|f| f.filename == filename)
    }

    /// Insert or replace by filename. A replaced file keeps its position.
    pub fn put(&mut self, file: StoredFile) {
        self.updated_at = file.updated_at;
        match self.files.iter_mut().find(|f| f.filename == file.filename) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = StoredFile { created_at, ..file };
            }
            None => self.files.push(file),
        }
    }

    pub fn remove(&mut self, filename: &str, now: DateTime<Utc>) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.filename != filename);
        let removed = self.files.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn bin_json(&self, id: &str, now: DateTime<Utc>) -> Value {
        let bytes = self.bytes();
        let expired_at = self.created_at + Duration::days(EXPIRY_DAYS);
        json!({
            "id": id,
            "readonly": self.readonly,
            "bytes": bytes,
            "bytes_readable": readable_size(bytes),
            "updated_at": self.updated_at.to_rfc3339(),
            "updated_at_relative": relative(self.updated_at, now),
            "created_at": self.created_at.to_rfc3339(),
            "created_at_relative": relative(self.created_at, now),
            "expired_at": expired_at.to_rfc3339(),
            "expired_at_relative": relative(expired_at, now),
        })
    }

    /// Body of `GET /{bin}`.
    pub fn response_json(&self, id: &str, now: DateTime<Utc>) -> Value {
        let files: Vec<Value> = self.files.iter().map(|f| f.file_json(now)).collect();
        json!({
            "bin": self.bin_json(id, now),
            "files": files,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
    pub md5: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn new(filename: &str, content_type: &str, data: Bytes, now: DateTime<Utc>) -> Self {
        Self {
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            md5: hex::encode(Md5::digest(&data)),
            sha256: hex::encode(Sha256::digest(&data)),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file_json(&self, now: DateTime<Utc>) -> Value {
        let bytes = self.data.len() as u64;
        json!({
            "filename": self.filename,
            "content-type": self.content_type,
            "bytes": bytes,
            "bytes_readable": readable_size(bytes),
            "md5": self.md5,
            "sha256": self.sha256,
            "updated_at": self.updated_at.to_rfc3339(),
            "updated_at_relative": relative(self.updated_at, now),
            "created_at": self.created_at.to_rfc3339(),
            "created_at_relative": relative(self.created_at, now),
        })
    }
}

/// Decimal units, one fractional digit: `512 B`, `1.5 kB`, `20.0 MB`.
pub(crate) fn readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `3 minutes ago`, `in 6 days`, or `just now` within a few seconds.
pub(crate) fn relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = at.signed_duration_since(now);
    let secs = delta.num_seconds().unsigned_abs();
    if secs < 5 {
        return "just now".to_owned();
    }
    let (n, unit) = match secs {
        s if s >= 86_400 => (s / 86_400, "day"),
        s if s >= 3_600 => (s / 3_600, "hour"),
        s if s >= 60 => (s / 60, "minute"),
        s => (s, "second"),
    };
    let plural = if n == 1 { "" } else { "s" };
    if delta.num_seconds() > 0 {
        format!("in {n} {unit}{plural}")
    } else {
        format!("{n} {unit}{plural} ago")
    }
}
