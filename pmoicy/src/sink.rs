//! Audio sample sink
//!
//! The session worker hands every audio chunk, metadata block and state
//! change to an [`AudioSink`]. [`ChannelSink`] is the stock implementation:
//! a bounded single-producer queue read through an [`AudioReader`], plus
//! event publishers for metadata and session state.

use crate::error::{Error, Result};
use crate::events::{EventPublisher, EventReceiver, MetadataEvent, SessionEvent};
use crate::reader::AudioReader;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Destination of a session's output
///
/// `write_audio` may wait for room in the pipeline; an error means the
/// consumer is gone and ends the session. `publish_session` must return
/// promptly once `stop` is cancelled.
#[async_trait]
pub trait AudioSink: Send + 'static {
    async fn write_audio(&mut self, chunk: Bytes) -> Result<()>;

    async fn publish_metadata(&mut self, event: MetadataEvent);

    async fn publish_session(&mut self, event: SessionEvent, stop: &CancellationToken);
}

/// Sink feeding a bounded audio queue
pub struct ChannelSink {
    audio_tx: mpsc::Sender<Bytes>,
    metadata: EventPublisher<MetadataEvent>,
    session: EventPublisher<SessionEvent>,
}

impl ChannelSink {
    /// Creates the sink and the reader of its audio queue.
    ///
    /// `capacity` is the number of chunks the queue holds before the worker
    /// waits for the pipeline.
    pub fn new(capacity: usize) -> (Self, AudioReader) {
        let (audio_tx, audio_rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            audio_tx,
            metadata: EventPublisher::new(),
            session: EventPublisher::new(),
        };
        (sink, AudioReader::new(audio_rx))
    }

    /// Subscribes to metadata blocks; events are dropped while the channel is full
    pub fn subscribe_metadata(&mut self, capacity: usize) -> EventReceiver<MetadataEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.metadata.subscribe(tx);
        EventReceiver::new(rx)
    }

    /// Subscribes to session state changes
    ///
    /// These are delivered with backpressure: a full channel delays the worker
    /// until the session is cancelled, after which events that do not fit
    /// are dropped.
    pub fn subscribe_session(&mut self, capacity: usize) -> EventReceiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.session.subscribe(tx);
        EventReceiver::new(rx)
    }
}

#[async_trait]
impl AudioSink for ChannelSink {
    async fn write_audio(&mut self, chunk: Bytes) -> Result<()> {
        trace!("Queueing {} audio bytes", chunk.len());
        self.audio_tx
            .send(chunk)
            .await
            .map_err(|_| Error::other("audio reader dropped"))
    }

    async fn publish_metadata(&mut self, event: MetadataEvent) {
        self.metadata.publish(event);
    }

    async fn publish_session(&mut self, event: SessionEvent, stop: &CancellationToken) {
        self.session.publish_until(event, stop).await;
    }
}
