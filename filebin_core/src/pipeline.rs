//! Staged byte transfer: source -> optional transform -> sink.
//!
//! Every upload and download goes through a [`Pipeline`]. The pipeline owns
//! all of its stages, so whichever way `run` returns (success, or a failure in
//! any stage) the source stream, the transform and the sink are dropped
//! together and their file handles or connections are released.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Boxed byte stream used for request and response bodies.
pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static>;

/// A stateful byte transform placed between source and sink.
///
/// `update` may hold input back (for example until a block boundary) and
/// `finish` flushes whatever is left once the source is exhausted.
pub trait Transform: Send + 'static {
    fn update(&mut self, input: &[u8]) -> std::io::Result<Bytes>;

    fn finish(&mut self) -> std::io::Result<Bytes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Transform,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Sink => "sink",
        })
    }
}

#[derive(Debug, Error)]
#[error("pipeline {stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: std::io::Error,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self { stage, source }
    }
}

pub struct Pipeline {
    source: ByteStream,
    transform: Option<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Transform) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Drive the pipeline to completion and return the bytes written to `sink`.
    ///
    /// A chunk is only pulled from the source once the previous one has been
    /// fully written, so a slow sink slows the source down.
    pub async fn run<W>(self, mut sink: W) -> Result<u64, PipelineError>
    where
        W: AsyncWrite + Unpin,
    {
        let Self {
            mut source,
            mut transform,
        } = self;
        let mut written = 0u64;

        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(PipelineError::at(Stage::Source))?;
            let out = match transform.as_mut() {
                Some(t) => t.update(&chunk).map_err(PipelineError::at(Stage::Transform))?,
                None => chunk,
            };
            if out.is_empty() {
                continue;
            }
            sink.write_all(&out)
                .await
                .map_err(PipelineError::at(Stage::Sink))?;
            written += out.len() as u64;
        }

        if let Some(t) = transform.as_mut() {
            let tail = t.finish().map_err(PipelineError::at(Stage::Transform))?;
            sink.write_all(&tail)
                .await
                .map_err(PipelineError::at(Stage::Sink))?;
            written += tail.len() as u64;
        }

        sink.flush().await.map_err(PipelineError::at(Stage::Sink))?;
        sink.shutdown()
            .await
            .map_err(PipelineError::at(Stage::Sink))?;

        tracing::trace!("pipeline finished after {written} bytes");
        Ok(written)
    }

    /// Apply the transform lazily and expose the result as a stream, for
    /// sinks that pull (such as an HTTP request body).
    pub fn into_stream(self) -> ByteStream {
        match self.transform {
            None => self.source,
            Some(transform) => Box::new(TransformStream {
                source: self.source,
                transform: Some(transform),
            }),
        }
    }
}

struct TransformStream {
    source: ByteStream,
    // None once finished or failed
    transform: Option<Box<dyn Transform>>,
}

impl Stream for TransformStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(transform) = this.transform.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(this.source.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => match transform.update(&chunk) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => return Poll::Ready(Some(Ok(out))),
                    Err(e) => {
                        this.transform = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Some(Err(e)) => {
                    this.transform = None;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    let result = transform.finish();
                    this.transform = None;
                    return Poll::Ready(Some(result));
                }
            }
        }
    }
}
