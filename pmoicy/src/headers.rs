//! ICY response headers
//!
//! Icecast and SHOUTcast servers describe the stream with `icy-*` headers.
//! Only `icy-metaint` drives the protocol; the others are informational.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::Serialize;

use crate::playlist::PlaylistFormat;

/// Content types accepted as audio without further inspection
pub const AUDIO_CONTENT_TYPES: &[&str] = &["audio/", "application/ogg", "video/ogg"];

/// The `icy-metaint` header as sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MetaInt {
    Missing,
    /// Present but not a non-negative integer
    Invalid(String),
    Value(usize),
}

impl MetaInt {
    /// Positive interval, if the server declared one
    pub fn interval(&self) -> Option<usize> {
        match self {
            MetaInt::Value(n) if *n > 0 => Some(*n),
            _ => None,
        }
    }
}

/// Stream description extracted from the response headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcyHeaders {
    pub metaint: MetaInt,
    pub name: Option<String>,
    pub genre: Option<String>,
    /// Bitrate in kbps
    pub bitrate: Option<u32>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub content_type: Option<String>,
}

impl IcyHeaders {
    /// Reads the `icy-*` and `content-type` headers.
    ///
    /// Text values are sanitized with [`sanitize_header`].
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| sanitize_header(&String::from_utf8_lossy(v.as_bytes())))
        };

        let metaint = match text("icy-metaint") {
            None => MetaInt::Missing,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => MetaInt::Value(n),
                Err(_) => MetaInt::Invalid(raw),
            },
        };

        // "128" ou "128,128" selon les serveurs
        let bitrate = text("icy-br").and_then(|raw| {
            raw.split(',')
                .next()
                .and_then(|first| first.trim().parse::<u32>().ok())
        });

        let public = text("icy-pub").map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"));

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(sanitize_header);

        Self {
            metaint,
            name: text("icy-name"),
            genre: text("icy-genre"),
            bitrate,
            url: text("icy-url"),
            description: text("icy-description"),
            public,
            content_type,
        }
    }

    /// Whether the server sent any descriptive `icy-*` header
    pub fn has_icy_headers(&self) -> bool {
        self.metaint != MetaInt::Missing
            || self.name.is_some()
            || self.genre.is_some()
            || self.bitrate.is_some()
            || self.url.is_some()
            || self.description.is_some()
    }

    /// Content type without parameters, lowercased
    pub fn mime_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
    }
}

/// What the response body holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Audio,
    Playlist(PlaylistFormat),
    Hls,
    NotAudio(String),
}

/// Classifies a response from its content type and URL path.
///
/// The path extension is only consulted when the content type is missing or
/// generic (`text/plain`, `application/octet-stream`).
pub fn classify_content(headers: &IcyHeaders, path: &str) -> ContentKind {
    let mime = headers.mime_type();

    match mime.as_deref() {
        Some("application/vnd.apple.mpegurl") | Some("application/x-mpegurl") => {
            return ContentKind::Hls
        }
        Some("audio/x-scpls") => return ContentKind::Playlist(PlaylistFormat::Pls),
        Some("audio/x-mpegurl") | Some("audio/mpegurl") => {
            return ContentKind::Playlist(PlaylistFormat::M3u)
        }
        Some(m) if AUDIO_CONTENT_TYPES.iter().any(|prefix| m.starts_with(prefix)) => {
            return ContentKind::Audio
        }
        _ => {}
    }

    let generic = matches!(
        mime.as_deref(),
        None | Some("text/plain") | Some("application/octet-stream")
    );
    if generic {
        let path = path.to_ascii_lowercase();
        if path.ends_with(".pls") {
            return ContentKind::Playlist(PlaylistFormat::Pls);
        }
        if path.ends_with(".m3u") || path.ends_with(".m3u8") {
            return ContentKind::Playlist(PlaylistFormat::M3u);
        }
        if headers.has_icy_headers() {
            return ContentKind::Audio;
        }
    }

    ContentKind::NotAudio(mime.unwrap_or_else(|| "<none>".to_string()))
}

/// Sanitizes a header value.
///
/// Control characters are removed, runs of whitespace collapse to one space
/// and the result is trimmed. Empty values give `None`.
pub fn sanitize_header(value: &str) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> IcyHeaders {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        IcyHeaders::from_header_map(&map)
    }

    #[test]
    fn test_parse_icy_headers() {
        let h = headers(&[
            ("icy-metaint", "16000"),
            ("icy-name", "  Radio   Test  "),
            ("icy-genre", "Jazz"),
            ("icy-br", "128,128"),
            ("icy-pub", "1"),
            ("content-type", "audio/mpeg"),
        ]);
        assert_eq!(h.metaint, MetaInt::Value(16000));
        assert_eq!(h.metaint.interval(), Some(16000));
        assert_eq!(h.name.as_deref(), Some("Radio Test"));
        assert_eq!(h.genre.as_deref(), Some("Jazz"));
        assert_eq!(h.bitrate, Some(128));
        assert_eq!(h.public, Some(true));
        assert_eq!(h.mime_type().as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn test_invalid_and_missing_metaint() {
        assert_eq!(headers(&[]).metaint, MetaInt::Missing);
        let h = headers(&[("icy-metaint", "-5")]);
        assert_eq!(h.metaint, MetaInt::Invalid("-5".to_string()));
        assert_eq!(h.metaint.interval(), None);
        assert_eq!(headers(&[("icy-metaint", "0")]).metaint.interval(), None);
    }

    #[test]
    fn test_sanitize_header() {
        assert_eq!(sanitize_header("a\tb\u{7}c  d"), Some("abc d".to_string()));
        assert_eq!(sanitize_header("   "), None);
    }

    #[test]
    fn test_classify_content() {
        let audio = headers(&[("content-type", "audio/aacp")]);
        assert_eq!(classify_content(&audio, "/live"), ContentKind::Audio);

        let pls = headers(&[("content-type", "audio/x-scpls")]);
        assert_eq!(
            classify_content(&pls, "/listen"),
            ContentKind::Playlist(PlaylistFormat::Pls)
        );

        let generic = headers(&[("content-type", "text/plain")]);
        assert_eq!(
            classify_content(&generic, "/radio.M3U"),
            ContentKind::Playlist(PlaylistFormat::M3u)
        );

        let hls = headers(&[("content-type", "application/vnd.apple.mpegurl")]);
        assert_eq!(classify_content(&hls, "/x.m3u8"), ContentKind::Hls);

        let html = headers(&[("content-type", "text/html; charset=utf-8")]);
        assert_eq!(
            classify_content(&html, "/"),
            ContentKind::NotAudio("text/html".to_string())
        );

        let bare_icy = headers(&[("icy-name", "Radio")]);
        assert_eq!(classify_content(&bare_icy, "/"), ContentKind::Audio);
        assert!(matches!(
            classify_content(&headers(&[]), "/"),
            ContentKind::NotAudio(_)
        ));
    }
}
