//! Local ends of a transfer: file sources, file sinks and scratch artifacts.

use std::path::{Path, PathBuf};

use filebin_core::{ByteStream, Error, Pipeline, Result};
use tempfile::TempPath;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Stream a local file in `chunk_size` reads, together with its length.
pub(crate) async fn open_file_source(path: &Path, chunk_size: usize) -> Result<(ByteStream, u64)> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((Box::new(ReaderStream::with_capacity(file, chunk_size)), len))
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(Error::InvalidDirectory(dir.to_path_buf())),
    }
}

/// Directory a file path will be written into; `.` for bare names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Drive `pipeline` into a freshly created file at `dest`.
///
/// On failure the partial file is removed before the pipeline error is
/// returned. If the removal itself fails, that is only logged.
pub(crate) async fn write_file(pipeline: Pipeline, dest: &Path) -> Result<u64> {
    let file = File::create(dest).await?;
    match pipeline.run(file).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                tracing::warn!("failed to remove partial file {}: {rm}", dest.display());
            }
            Err(e.into())
        }
    }
}

/// A uniquely named file in the scratch directory.
///
/// Call [`release`](Self::release) when done with it. If it is dropped
/// instead the file is still removed, but any failure goes unreported.
#[derive(Debug)]
pub(crate) struct ScratchArtifact {
    path: TempPath,
}

impl ScratchArtifact {
    /// Create the artifact (and `dir`, if missing) and open it for writing.
    pub async fn create(dir: &Path) -> Result<(Self, File)> {
        tokio::fs::create_dir_all(dir).await?;
        let named = tempfile::Builder::new()
            .prefix("filebin-")
            .suffix(".enc")
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();
        tracing::debug!("scratch artifact {}", path.display());
        Ok((Self { path }, File::from_std(file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) -> Result<()> {
        let path: PathBuf = self.path.to_path_buf();
        self.path
            .close()
            .map_err(|source| Error::ScratchCleanupFailed {
                path,
                source,
                uploaded: None,
            })
    }
}
