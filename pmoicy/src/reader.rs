//! Pipeline side of the audio queue
//!
//! [`AudioReader`] exposes the audio bytes pushed by a session worker as an
//! [`AsyncRead`]: the host's decoder reads encoded audio from it with the
//! metadata already stripped. It reaches EOF once the worker has stopped
//! and the queue is drained.

use bytes::{Buf, Bytes};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{self, AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Reader over the audio chunks of a session
pub struct AudioReader {
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
    finished: bool,
}

impl AudioReader {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            finished: false,
        }
    }

    /// Next audio chunk, `None` once the session is over.
    ///
    /// Bytes left over by a previous partial read are returned first.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        if !self.current.is_empty() {
            return Some(std::mem::take(&mut self.current));
        }
        if self.finished {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => return Some(chunk),
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Whether the worker has stopped and the queue is drained
    pub fn is_finished(&self) -> bool {
        self.finished && self.current.is_empty()
    }
}

impl AsyncRead for AudioReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if !self.current.is_empty() {
                let to_copy = self.current.len().min(buf.remaining());
                if to_copy == 0 {
                    return Poll::Ready(Ok(()));
                }
                buf.put_slice(&self.current[..to_copy]);
                self.current.advance(to_copy);
                return Poll::Ready(Ok(()));
            }

            if self.finished {
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut self.rx).poll_recv(cx) {
                Poll::Ready(Some(bytes)) => {
                    self.current = bytes;
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_read_across_chunks() {
        let (tx, rx) = mpsc::channel(4);
        let mut reader = AudioReader::new(rx);

        tx.send(Bytes::from_static(b"abc")).await.unwrap();
        tx.send(Bytes::new()).await.unwrap();
        tx.send(Bytes::from_static(b"defg")).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdefg");
        assert!(reader.is_finished());
    }

    #[tokio::test]
    async fn test_partial_read_then_next_chunk() {
        let (tx, rx) = mpsc::channel(4);
        let mut reader = AudioReader::new(rx);
        tx.send(Bytes::from_static(b"hello")).await.unwrap();
        drop(tx);

        let mut two = [0u8; 2];
        reader.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"he");
        assert_eq!(reader.next_chunk().await, Some(Bytes::from_static(b"llo")));
        assert_eq!(reader.next_chunk().await, None);
    }
}
