//! Session worker
//!
//! One tokio task per session: it connects, pulls frames from the stream,
//! hands audio to the sink and publishes metadata and state changes. On
//! end of stream or transport errors it reconnects, up to `max_retries`
//! consecutive attempts. Framing and tag errors are never retried.
//!
//! The task stops cooperatively: [`SessionHandle::disconnect`] cancels it
//! and waits until the connection is released. Once cancelled, the worker
//! no longer waits on slow session subscribers.

use crate::connector::IcyConnector;
use crate::demux::IcyFrame;
use crate::error::{Error, ErrorKind, Result};
use crate::events::{CloseReason, MetadataEvent, SessionEvent};
use crate::metadata::MetadataBlock;
use crate::sink::AudioSink;
use crate::stats::SessionStats;
use crate::stream::IcyStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Closed(CloseReason),
    Failed { kind: ErrorKind, message: String },
}

/// Final report of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub url: String,
    pub outcome: SessionOutcome,
    pub audio_bytes: u64,
    pub metadata_blocks: u64,
    pub reconnects: u64,
    pub connections_opened: u64,
    pub connections_released: u64,
}

impl SessionSummary {
    fn from_stats(url: String, outcome: SessionOutcome, stats: &SessionStats) -> Self {
        Self {
            url,
            outcome,
            audio_bytes: stats.audio_bytes(),
            metadata_blocks: stats.metadata_blocks(),
            reconnects: stats.reconnects(),
            connections_opened: stats.opened(),
            connections_released: stats.released(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Failed { .. })
    }
}

/// Handle to a running session
///
/// Dropping the handle stops the session without waiting for it.
pub struct SessionHandle {
    url: String,
    stop_token: CancellationToken,
    join_handle: Option<JoinHandle<SessionSummary>>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    pub(crate) fn spawn<S: AudioSink>(connector: IcyConnector, url: String, sink: S) -> Self {
        let stop_token = CancellationToken::new();
        let stats = SessionStats::new();

        let worker = SessionWorker {
            connector,
            url: url.clone(),
            sink,
            stop_token: stop_token.clone(),
            stats: Arc::clone(&stats),
            current_title: None,
        };
        let join_handle = tokio::spawn(worker.run());

        Self {
            url,
            stop_token,
            join_handle: Some(join_handle),
            stats,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Asks the session to stop without waiting
    pub fn cancel(&self) {
        self.stop_token.cancel();
    }

    /// Stops the session and waits until its connection is released
    pub async fn disconnect(mut self) -> Result<SessionSummary> {
        debug!(url = %self.url, "Disconnect requested");
        self.stop_token.cancel();
        self.join().await
    }

    /// Waits for the session to end on its own
    pub async fn wait(mut self) -> Result<SessionSummary> {
        self.join().await
    }

    async fn join(&mut self) -> Result<SessionSummary> {
        let handle = self
            .join_handle
            .take()
            .ok_or_else(|| Error::other("session already joined"))?;
        handle
            .await
            .map_err(|e| Error::other(format!("session task failed: {}", e)))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("url", &self.url)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Why the frame loop of one connection stopped
enum StreamEnd {
    Cancelled,
    ConsumerGone,
    /// Clean end (`error == None`) or transport failure
    Interrupted {
        error: Option<Error>,
        delivered_audio: bool,
    },
    Fatal(Error),
}

struct SessionWorker<S> {
    connector: IcyConnector,
    url: String,
    sink: S,
    stop_token: CancellationToken,
    stats: Arc<SessionStats>,
    current_title: Option<String>,
}

impl<S: AudioSink> SessionWorker<S> {
    async fn run(mut self) -> SessionSummary {
        info!(url = %self.url, "Starting ICY session");

        let outcome = self.drive().await;
        let event = match &outcome {
            SessionOutcome::Closed(reason) => SessionEvent::Closed { reason: *reason },
            SessionOutcome::Failed { kind, message } => {
                error!(url = %self.url, "ICY session failed ({:?}): {}", kind, message);
                SessionEvent::Failed {
                    kind: *kind,
                    message: message.clone(),
                }
            }
        };
        let stop = self.stop_token.clone();
        self.sink.publish_session(event, &stop).await;

        info!(url = %self.url, "ICY session stopped: {}", self.stats.report());
        SessionSummary::from_stats(self.url.clone(), outcome, &self.stats)
    }

    async fn drive(&mut self) -> SessionOutcome {
        let stop = self.stop_token.clone();
        let settings = self.connector.settings().clone();

        let connected = tokio::select! {
            biased;
            _ = stop.cancelled() => return SessionOutcome::Closed(CloseReason::Disconnected),
            result = self.connector.connect_with_stats(&self.url, &self.stats) => result,
        };
        let session = match connected {
            Ok(session) => session,
            Err(err) => return failed(&err),
        };

        self.sink
            .publish_session(
                SessionEvent::Connected {
                    url: session.final_url().to_string(),
                    headers: session.headers().clone(),
                },
                &stop,
            )
            .await;

        let mut stream = session.frames();
        let mut attempt = 0u32;

        loop {
            let end = self.pump(&mut stream).await;
            drop(stream);

            let (mut last_error, delivered_audio) = match end {
                StreamEnd::Cancelled => return SessionOutcome::Closed(CloseReason::Disconnected),
                StreamEnd::ConsumerGone => {
                    return SessionOutcome::Closed(CloseReason::ConsumerGone)
                }
                StreamEnd::Fatal(err) => return failed(&err),
                StreamEnd::Interrupted {
                    error,
                    delivered_audio,
                } => (error, delivered_audio),
            };

            if !settings.auto_reconnect {
                return match last_error {
                    None => SessionOutcome::Closed(CloseReason::EndOfStream),
                    Some(err) => failed(&err),
                };
            }

            match &last_error {
                None => info!(url = %self.url, "ICY stream ended, reconnecting"),
                Some(err) => warn!(url = %self.url, "ICY stream interrupted: {}", err),
            }

            // Un flux qui ne livre aucun audio ne remet pas le compteur à zéro
            if delivered_audio {
                attempt = 0;
            }

            stream = loop {
                if attempt >= settings.max_retries {
                    let reason = last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "end of stream".to_string());
                    return SessionOutcome::Failed {
                        kind: ErrorKind::Connection,
                        message: format!(
                            "gave up after {} reconnection attempts: {}",
                            settings.max_retries, reason
                        ),
                    };
                }
                attempt += 1;

                self.sink
                    .publish_session(
                        SessionEvent::Reconnecting {
                            attempt,
                            max_retries: settings.max_retries,
                        },
                        &stop,
                    )
                    .await;

                tokio::select! {
                    biased;
                    _ = stop.cancelled() => return SessionOutcome::Closed(CloseReason::Disconnected),
                    _ = tokio::time::sleep(settings.retry_delay()) => {}
                }

                let connected = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return SessionOutcome::Closed(CloseReason::Disconnected),
                    result = self.connector.connect_with_stats(&self.url, &self.stats) => result,
                };

                match connected {
                    Ok(session) => {
                        info!(url = %self.url, attempt, "Reconnected to ICY stream");
                        self.stats.record_reconnect();
                        self.sink
                            .publish_session(SessionEvent::Reconnected { attempt }, &stop)
                            .await;
                        break session.frames();
                    }
                    Err(err) => {
                        warn!(url = %self.url, attempt, "Reconnection failed: {}", err);
                        last_error = Some(err);
                    }
                }
            };
        }
    }

    async fn pump(&mut self, stream: &mut IcyStream) -> StreamEnd {
        let stop = self.stop_token.clone();
        let mut delivered_audio = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => {
                    return StreamEnd::Interrupted {
                        error: None,
                        delivered_audio,
                    }
                }
                Some(Ok(IcyFrame::Audio(chunk))) => {
                    let len = chunk.len();
                    let written = tokio::select! {
                        biased;
                        _ = stop.cancelled() => return StreamEnd::Cancelled,
                        result = self.sink.write_audio(chunk) => result,
                    };
                    if let Err(err) = written {
                        info!(url = %self.url, "Audio consumer gone: {}", err);
                        return StreamEnd::ConsumerGone;
                    }
                    self.stats.record_audio(len);
                    delivered_audio = true;
                }
                Some(Ok(IcyFrame::Metadata(block))) => {
                    self.stats.record_metadata();
                    let title_changed = self.track_title(&block);
                    self.sink
                        .publish_metadata(MetadataEvent {
                            url: self.url.clone(),
                            block,
                            title_changed,
                        })
                        .await;
                }
                Some(Err(err)) if err.is_retryable() => {
                    return StreamEnd::Interrupted {
                        error: Some(err),
                        delivered_audio,
                    }
                }
                Some(Err(err)) => return StreamEnd::Fatal(err),
            }
        }
    }

    /// Records the block's title; true when it differs from the previous one
    fn track_title(&mut self, block: &MetadataBlock) -> bool {
        let Some(title) = block.stream_title() else {
            return false;
        };
        if self.current_title.as_deref() == Some(title) {
            return false;
        }
        info!(url = %self.url, "Now playing: {}", title);
        self.current_title = Some(title.to_string());
        true
    }
}

fn failed(err: &Error) -> SessionOutcome {
    SessionOutcome::Failed {
        kind: err.kind(),
        message: err.to_string(),
    }
}
