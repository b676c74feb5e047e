//! ICY stream client for PMOMusic
//!
//! This crate connects to Icecast/SHOUTcast HTTP audio streams that
//! interleave "now playing" metadata into the audio bytes, separates the
//! two, and forwards pure audio to a playback pipeline while publishing the
//! metadata as events.
//!
//! # Features
//!
//! - **Stream Connector**: HTTP connection with `Icy-MetaData: 1`, response
//!   validation, `icy-*` header parsing, PLS/M3U playlist resolution
//! - **Frame Demuxer**: sans-IO, chunking-independent split of the byte
//!   stream into audio chunks and metadata blocks, with desync detection
//! - **Audio Sink**: bounded audio queue exposed as an `AsyncRead`, plus
//!   metadata and session events
//! - **Session Worker**: one task per stream, cooperative cancellation,
//!   automatic reconnection
//! - **Configuration Extension**: `sources.icy.*` keys in pmoconfig
//!
//! # Wire format
//!
//! ```text
//! | metaint audio bytes | n | n*16 bytes "StreamTitle='...';" + NUL padding | ...
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pmoicy::IcyClient;
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = IcyClient::new()?;
//!     let (mut sink, mut audio) = client.channel_sink();
//!     let mut metadata = sink.subscribe_metadata(16);
//!
//!     let session = client.spawn("http://radio.example.com:8000/live", sink);
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = metadata.recv().await {
//!             if event.title_changed {
//!                 println!("Now playing: {}", event.block);
//!             }
//!         }
//!     });
//!
//!     // Hand `audio` to a decoder; here we only count bytes
//!     let mut buf = vec![0u8; 4096];
//!     let mut total = 0;
//!     while total < 1_000_000 {
//!         let n = audio.read(&mut buf).await?;
//!         if n == 0 {
//!             break;
//!         }
//!         total += n;
//!     }
//!
//!     let summary = session.disconnect().await?;
//!     println!("{:?}", summary.outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Low-level use
//!
//! The connector and the demuxer can be used without the worker:
//!
//! ```no_run
//! use futures::StreamExt;
//! use pmoicy::{IcyConnector, IcyFrame, IcySettings};
//!
//! # async fn run() -> pmoicy::Result<()> {
//! let connector = IcyConnector::new(IcySettings::default())?;
//! let session = connector.connect("http://radio.example.com:8000/live").await?;
//! println!("metaint = {}", session.metaint());
//!
//! let mut frames = session.frames();
//! while let Some(frame) = frames.next().await {
//!     if let IcyFrame::Metadata(block) = frame? {
//!         println!("{:?}", block.stream_title());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connector;
pub mod demux;
pub mod error;
pub mod events;
pub mod headers;
pub mod metadata;
pub mod playlist;
pub mod reader;
pub mod settings;
pub mod sink;
pub mod source;
pub mod stats;
pub mod stream;
pub mod worker;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

// Re-exports
pub use client::{ClientBuilder, IcyClient};
pub use connector::{IcyConnector, IcySession};
pub use demux::{IcyDemuxer, IcyFrame};
pub use error::{Error, ErrorKind, Result};
pub use events::{
    CloseReason, EventPublisher, EventReceiver, IcyEvent, MetadataEvent, SessionEvent,
};
pub use headers::{IcyHeaders, MetaInt};
pub use metadata::{encode_metadata_block, MetadataBlock, MAX_METADATA_LEN};
pub use playlist::PlaylistFormat;
pub use reader::AudioReader;
pub use settings::IcySettings;
pub use sink::{AudioSink, ChannelSink};
pub use source::{IcySource, StreamTrackInfo, SOURCE_NAME};
pub use stats::SessionStats;
pub use stream::{IcyStream, StreamProgress};
pub use worker::{SessionHandle, SessionOutcome, SessionSummary};

#[cfg(feature = "pmoconfig")]
pub use config_ext::IcyConfigExt;
