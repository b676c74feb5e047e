//! Stream detection and track loading
//!
//! Decides whether an identifier looks like a radio stream and builds the
//! track description a player shows for it.

use crate::connector::IcyConnector;
use crate::error::Result;
use crate::headers::IcyHeaders;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Name under which the source registers
pub const SOURCE_NAME: &str = "icy-stream";

/// Title used when the server sends no `icy-name`
pub const DEFAULT_TITLE: &str = "Radio Stream";

/// Author used when the server sends no `icy-genre`
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Content types identifying a stream on a HEAD probe
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/aac",
    "audio/aacp",
    "audio/x-mpegurl",
    "application/vnd.apple.mpegurl",
    "audio/mpegurl",
    "audio/x-scpls",
];

static STREAM_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://.*\.(mp3|aac|aacp|m3u8|pls)(?:\?.*)?$|^https?://.*(?:radio|stream|live|broadcast).*$",
    )
    .expect("stream URL pattern is valid")
});

/// Description of a live stream track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamTrackInfo {
    pub title: String,
    pub author: String,
    pub uri: String,
    /// Bitrate in kbps
    pub bitrate: Option<u32>,
    pub genre: Option<String>,
    pub is_stream: bool,
    /// Always `None`: a live stream has no end
    pub length: Option<u64>,
}

impl StreamTrackInfo {
    fn from_headers(uri: &str, headers: &IcyHeaders) -> Self {
        Self {
            title: headers
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            author: headers
                .genre
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            uri: uri.to_string(),
            bitrate: headers.bitrate,
            genre: headers.genre.clone(),
            is_stream: true,
            length: None,
        }
    }
}

/// Whether the URL alone identifies a stream
pub fn matches_stream_pattern(url: &str) -> bool {
    STREAM_URL_PATTERN.is_match(url)
}

/// Radio stream source
#[derive(Debug, Clone)]
pub struct IcySource {
    connector: IcyConnector,
}

impl IcySource {
    pub fn new(connector: IcyConnector) -> Self {
        Self { connector }
    }

    pub fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    /// Checks the URL pattern, then falls back to a HEAD probe.
    ///
    /// The probe accepts a supported content type or any `icy-name` /
    /// `icy-genre` header. Probe failures count as "not a stream".
    pub async fn is_stream_url(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        if matches_stream_pattern(url) {
            return true;
        }

        match self.connector.head(url).await {
            Ok(headers) => {
                let by_type = headers
                    .content_type
                    .as_deref()
                    .map(str::to_ascii_lowercase)
                    .map(|ct| SUPPORTED_CONTENT_TYPES.iter().any(|t| ct.contains(t)))
                    .unwrap_or(false);
                let by_icy = headers.name.is_some() || headers.genre.is_some();
                debug!(url, by_type, by_icy, "Probed stream URL");
                by_type || by_icy
            }
            Err(e) => {
                debug!("Failed to probe {}: {}", url, e);
                false
            }
        }
    }

    /// Reads the stream headers and describes the track
    pub async fn describe(&self, url: &str) -> Result<StreamTrackInfo> {
        let headers = self.connector.describe(url).await?;
        let info = StreamTrackInfo::from_headers(url, &headers);
        info!(
            "Loaded stream: {} - {} ({} kbps)",
            info.title,
            info.author,
            info.bitrate
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        Ok(info)
    }

    /// Loads a track for `url`, `None` when it is not a usable stream
    pub async fn load_item(&self, url: &str) -> Option<StreamTrackInfo> {
        if !self.is_stream_url(url).await {
            debug!("{} is not identified as a stream URL", url);
            return None;
        }

        match self.describe(url).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Failed to load stream {}: {}", url, e);
                None
            }
        }
    }
}
