//! ICY metadata blocks
//!
//! A metadata block is the text carried between two audio intervals:
//! `StreamTitle='Artist - Title';StreamUrl='http://...';` padded with NUL
//! bytes to a multiple of 16 and prefixed on the wire by a length byte
//! (`length × 16` bytes follow).

use crate::error::{Error, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

/// Largest block a length byte can announce (255 × 16)
pub const MAX_METADATA_LEN: usize = 255 * 16;

/// Conventional key of the current track title
pub const STREAM_TITLE: &str = "StreamTitle";

/// Conventional key of the URL attached to the current track
pub const STREAM_URL: &str = "StreamUrl";

// Le terminateur est `';` : une apostrophe seule dans la valeur est conservée
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)([A-Za-z][A-Za-z0-9_]*)='(.*?)';").expect("ICY tag pattern is valid")
});

/// Parsed content of one ICY metadata block
///
/// Valid until superseded by the next block of the same stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    fields: Vec<(String, String)>,
    raw: String,
    audio_offset: u64,
}

impl MetadataBlock {
    /// Builds a block from already parsed fields
    pub fn new(fields: Vec<(String, String)>, audio_offset: u64) -> Self {
        let raw = fields
            .iter()
            .map(|(k, v)| format!("{}='{}';", k, v))
            .collect::<String>();
        Self {
            fields,
            raw,
            audio_offset,
        }
    }

    /// Parses the text of a block.
    ///
    /// Returns [`Error::Decode`] when the text holds no `key='value';` pair.
    pub fn parse(text: &str, audio_offset: u64) -> Result<Self> {
        let fields: Vec<(String, String)> = TAG_PATTERN
            .captures_iter(text)
            .map(|cap| (cap[1].to_string(), cap[2].to_string()))
            .collect();

        if fields.is_empty() {
            return Err(Error::decode(format!(
                "no key='value' pair in metadata block: {:?}",
                truncate(text, 64)
            )));
        }

        debug!(fields = fields.len(), offset = audio_offset, "Parsed ICY metadata block");

        Ok(Self {
            fields,
            raw: text.to_string(),
            audio_offset,
        })
    }

    /// Value of a tag, compared case-insensitively on the key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Current track title, `None` when absent or blank
    pub fn stream_title(&self) -> Option<&str> {
        self.get(STREAM_TITLE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// URL attached to the current track, `None` when absent or blank
    pub fn stream_url(&self) -> Option<&str> {
        self.get(STREAM_URL).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Splits the title on the conventional `"Artist - Title"` separator.
    ///
    /// Returns `(None, title)` when there is no separator.
    pub fn artist_title(&self) -> Option<(Option<&str>, &str)> {
        let title = self.stream_title()?;
        match title.split_once(" - ") {
            Some((artist, track)) if !artist.trim().is_empty() => {
                Some((Some(artist.trim()), track.trim()))
            }
            _ => Some((None, title)),
        }
    }

    /// All tags, in stream order
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Block text as received (padding removed)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Number of audio bytes that preceded this block on the stream
    pub fn audio_offset(&self) -> u64 {
        self.audio_offset
    }
}

impl fmt::Display for MetadataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream_title() {
            Some(title) => write!(f, "{}", title),
            None => write!(f, "{}", self.raw),
        }
    }
}

/// Turns the payload of a block (padding included) into text.
///
/// - Trailing NUL padding is removed; an all-padding block yields `None`.
/// - NUL or control bytes inside the content mean the bytes are audio, not
///   tag text: the reader lost the interval alignment ([`Error::Desync`]).
/// - Invalid UTF-8 is read as ISO-8859-1, which older SHOUTcast servers send.
pub fn decode_block_text(payload: &[u8]) -> Result<Option<String>> {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    let content = &payload[..end];

    if let Some(pos) = content
        .iter()
        .position(|&b| b == 0 || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f)
    {
        return Err(Error::desync(format!(
            "binary byte 0x{:02x} at position {} of a {}-byte metadata block",
            content[pos],
            pos,
            payload.len()
        )));
    }

    let text = match std::str::from_utf8(content) {
        Ok(s) => s.to_string(),
        Err(_) => content.iter().map(|&b| b as char).collect(),
    };

    let text = text.trim();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text.to_string()))
    }
}

/// Produces the wire form of a metadata block.
///
/// ICY format: length byte, then the text padded with NUL bytes to a
/// multiple of 16. An empty text gives the single `0` byte meaning "no change".
pub fn encode_metadata_block(text: &str) -> Result<Bytes> {
    let metadata_bytes = text.as_bytes();
    let length = metadata_bytes.len();
    if length > MAX_METADATA_LEN {
        return Err(Error::other(format!(
            "metadata text is {} bytes, at most {} fit in a block",
            length, MAX_METADATA_LEN
        )));
    }

    let padded_length = length.div_ceil(16) * 16;
    let length_byte = (padded_length / 16) as u8;

    let mut result = Vec::with_capacity(1 + padded_length);
    result.push(length_byte);
    result.extend_from_slice(metadata_bytes);
    result.resize(1 + padded_length, 0);

    Ok(Bytes::from(result))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
