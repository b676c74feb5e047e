//! PLS and M3U playlist resolution
//!
//! Many radio directories publish a playlist instead of the stream itself.
//! The connector fetches it and follows the first usable entry.

use crate::error::{Error, Result};
use tracing::debug;
use url::Url;

/// Playlist formats followed by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    Pls,
    M3u,
}

/// Extracts the stream URLs of a playlist, in playlist order.
///
/// Relative entries are resolved against `base`; entries that are not
/// `http`/`https` are dropped. An HLS media playlist (`#EXT-X-` tags) is a
/// [`Error::Connection`].
pub fn parse_playlist(format: PlaylistFormat, text: &str, base: &Url) -> Result<Vec<Url>> {
    let entries = match format {
        PlaylistFormat::Pls => pls_entries(text),
        PlaylistFormat::M3u => m3u_entries(text)?,
    };

    let urls: Vec<Url> = entries
        .into_iter()
        .filter_map(|entry| match base.join(&entry) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                debug!("Ignoring playlist entry with scheme {}: {}", url.scheme(), url);
                None
            }
            Err(e) => {
                debug!("Ignoring invalid playlist entry {:?}: {}", entry, e);
                None
            }
        })
        .collect();

    debug!(format = ?format, entries = urls.len(), "Parsed playlist {}", base);
    Ok(urls)
}

fn pls_entries(text: &str) -> Vec<String> {
    let mut files: Vec<(u32, String)> = text
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            let index = key.trim().strip_prefix("File")?.parse::<u32>().ok()?;
            let value = value.trim();
            (!value.is_empty()).then(|| (index, value.to_string()))
        })
        .collect();
    files.sort_by_key(|(index, _)| *index);
    files.into_iter().map(|(_, url)| url).collect()
}

fn m3u_entries(text: &str) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.starts_with("#EXT-X-") {
            return Err(Error::connection("HLS playlists are not supported"));
        }
        if !line.is_empty() && !line.starts_with('#') {
            entries.push(line.to_string());
        }
    }
    Ok(entries)
}
