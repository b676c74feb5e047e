//! Frame stream over an open ICY connection
//!
//! [`IcyStream`] reads the response body, feeds the demuxer and yields
//! [`IcyFrame`]s in stream order. It owns the connection: dropping the
//! stream, or reaching its end, releases it.

use crate::demux::{IcyDemuxer, IcyFrame};
use crate::error::{Error, Result};
use crate::stats::ConnectionGuard;
use async_stream::try_stream;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// Response body of a stream connection
pub type BoxedBody = Box<dyn AsyncRead + Send + Unpin>;

/// Demuxer position, readable while the stream is being consumed
#[derive(Debug, Default)]
pub struct StreamProgress {
    audio_bytes: AtomicU64,
    metadata_blocks: AtomicU64,
    interval_offset: AtomicUsize,
}

impl StreamProgress {
    fn update(&self, demuxer: &IcyDemuxer) {
        self.audio_bytes
            .store(demuxer.audio_bytes(), Ordering::Relaxed);
        self.metadata_blocks
            .store(demuxer.metadata_blocks(), Ordering::Relaxed);
        self.interval_offset
            .store(demuxer.interval_offset(), Ordering::Relaxed);
    }

    /// Audio bytes decoded so far on this connection
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes.load(Ordering::Relaxed)
    }

    pub fn metadata_blocks(&self) -> u64 {
        self.metadata_blocks.load(Ordering::Relaxed)
    }

    /// Audio bytes since the last metadata block (see [`IcyDemuxer::interval_offset`])
    pub fn interval_offset(&self) -> usize {
        self.interval_offset.load(Ordering::Relaxed)
    }
}

/// Stream of demultiplexed frames of one connection
///
/// Ends with `None` on a clean end of stream. A framing or transport error
/// is yielded once, after the frames that preceded it, and ends the stream.
pub struct IcyStream {
    url: String,
    metaint: usize,
    inner: BoxStream<'static, Result<IcyFrame>>,
    progress: Arc<StreamProgress>,
}

impl IcyStream {
    pub(crate) fn new(
        body: BoxedBody,
        demuxer: IcyDemuxer,
        guard: ConnectionGuard,
        read_timeout: Option<Duration>,
        buffer_size: usize,
    ) -> Self {
        let url = guard.url().to_string();
        let metaint = demuxer.metaint();
        let progress = Arc::new(StreamProgress::default());
        let inner = Box::pin(frame_stream(
            body,
            demuxer,
            guard,
            read_timeout,
            buffer_size,
            Arc::clone(&progress),
        ));

        Self {
            url,
            metaint,
            inner,
            progress,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Interval in use, 0 when the stream carries no metadata
    pub fn metaint(&self) -> usize {
        self.metaint
    }

    pub fn progress(&self) -> Arc<StreamProgress> {
        Arc::clone(&self.progress)
    }
}

impl Stream for IcyStream {
    type Item = Result<IcyFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for IcyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcyStream")
            .field("url", &self.url)
            .field("metaint", &self.metaint)
            .field("progress", &self.progress)
            .finish()
    }
}

fn frame_stream(
    mut body: BoxedBody,
    mut demuxer: IcyDemuxer,
    guard: ConnectionGuard,
    read_timeout: Option<Duration>,
    buffer_size: usize,
    progress: Arc<StreamProgress>,
) -> impl Stream<Item = Result<IcyFrame>> + Send + 'static {
    try_stream! {
        let mut buf = vec![0u8; buffer_size.max(1)];
        let mut frames = Vec::new();

        loop {
            let read = match read_timeout {
                Some(limit) => tokio::time::timeout(limit, body.read(&mut buf))
                    .await
                    .map_err(|_| Error::Timeout)?,
                None => body.read(&mut buf).await,
            };
            let n = read.map_err(Error::from)?;

            if n == 0 {
                demuxer.finish()?;
                debug!(
                    url = %guard.url(),
                    audio_bytes = demuxer.audio_bytes(),
                    blocks = demuxer.metadata_blocks(),
                    "ICY stream ended"
                );
                guard.release();
                break;
            }

            trace!("Read {} bytes from {}", n, guard.url());
            let pushed = demuxer.push(&buf[..n], &mut frames);
            progress.update(&demuxer);

            // Les frames décodées avant une erreur sont livrées d'abord
            for frame in frames.drain(..) {
                yield frame;
            }
            pushed?;
        }
    }
}
