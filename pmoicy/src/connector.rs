//! Stream connector
//!
//! Opens the HTTP connection to an Icecast/SHOUTcast endpoint, asks for
//! interleaved metadata, validates the response and hands out an
//! [`IcySession`] positioned on the first audio byte.
//!
//! Playlists (`.pls`, `.m3u`) are followed to the stream they point to.

use crate::demux::IcyDemuxer;
use crate::error::{Error, Result};
use crate::headers::{classify_content, ContentKind, IcyHeaders, MetaInt};
use crate::playlist::parse_playlist;
use crate::settings::IcySettings;
use crate::stats::{ConnectionGuard, SessionStats};
use crate::stream::{BoxedBody, IcyStream};
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, USER_AGENT};
use reqwest::{redirect, Client, Response};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use url::Url;

/// Nested playlists followed before giving up
pub const MAX_PLAYLIST_DEPTH: usize = 3;

/// Redirects followed when `follow_redirects` is set
const MAX_REDIRECTS: usize = 10;

/// Largest playlist body accepted
pub const MAX_PLAYLIST_BYTES: usize = 64 * 1024;

/// Opens ICY stream connections
#[derive(Debug, Clone)]
pub struct IcyConnector {
    client: Client,
    settings: IcySettings,
}

impl IcyConnector {
    /// Builds a connector with its own HTTP client
    pub fn new(settings: IcySettings) -> Result<Self> {
        let redirect_policy = if settings.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connection_timeout())
            .redirect(redirect_policy)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Uses an existing HTTP client (proxy, TLS setup, connection pool...)
    ///
    /// Redirect and timeout settings of the client are kept as they are.
    pub fn with_client(client: Client, settings: IcySettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &IcySettings {
        &self.settings
    }

    /// Connects to a stream, accounting the connection in fresh statistics
    pub async fn connect(&self, url: &str) -> Result<IcySession> {
        self.connect_with_stats(url, &SessionStats::new()).await
    }

    /// Connects to a stream.
    ///
    /// Fails with [`Error::Connection`] when the endpoint is unreachable,
    /// answers with a non-success status, does not serve audio, or (with
    /// `require_metaint`) omits a valid `icy-metaint` header.
    pub async fn connect_with_stats(
        &self,
        url: &str,
        stats: &Arc<SessionStats>,
    ) -> Result<IcySession> {
        self.open(url, stats, self.settings.require_metaint).await
    }

    /// Reads the stream headers, then closes the connection
    ///
    /// A missing `icy-metaint` is not an error here.
    pub async fn describe(&self, url: &str) -> Result<IcyHeaders> {
        let session = self.open(url, &SessionStats::new(), false).await?;
        let headers = session.headers().clone();
        session.disconnect();
        Ok(headers)
    }

    /// Issues a HEAD request with `Icy-MetaData: 1` and returns the headers
    pub async fn head(&self, url: &str) -> Result<IcyHeaders> {
        let url = parse_stream_url(url)?;
        let response = self
            .client
            .head(url.clone())
            .header(USER_AGENT, &self.settings.user_agent)
            .header("Icy-MetaData", "1")
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| Error::connection(format!("HEAD {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::connection(format!(
                "HEAD {} returned status {}",
                url,
                response.status()
            )));
        }

        Ok(IcyHeaders::from_header_map(response.headers()))
    }

    async fn open(
        &self,
        url: &str,
        stats: &Arc<SessionStats>,
        require_metaint: bool,
    ) -> Result<IcySession> {
        let requested = parse_stream_url(url)?;
        let mut target = requested.clone();
        let mut depth = 0;

        loop {
            let response = self.request(&target).await?;
            let guard = stats.open_connection(response.url().as_str());
            let final_url = response.url().clone();
            let headers = IcyHeaders::from_header_map(response.headers());

            match classify_content(&headers, final_url.path()) {
                ContentKind::Audio => {
                    let metaint = self.resolve_metaint(&final_url, &headers, require_metaint)?;
                    info!(
                        url = %final_url,
                        metaint,
                        name = headers.name.as_deref().unwrap_or(""),
                        "Connected to ICY stream"
                    );
                    return Ok(IcySession {
                        url: requested,
                        final_url,
                        headers,
                        metaint,
                        body: response_body(response),
                        guard,
                        settings: self.settings.clone(),
                    });
                }
                ContentKind::Playlist(format) => {
                    if depth >= MAX_PLAYLIST_DEPTH {
                        return Err(Error::connection(format!(
                            "more than {} nested playlists behind {}",
                            MAX_PLAYLIST_DEPTH, requested
                        )));
                    }
                    depth += 1;

                    let text = self.read_playlist(response, &final_url).await?;
                    drop(guard);

                    target = parse_playlist(format, &text, &final_url)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            Error::connection(format!("playlist {} holds no stream URL", final_url))
                        })?;
                    debug!("Playlist {} points to {}", final_url, target);
                }
                ContentKind::Hls => {
                    return Err(Error::connection(format!(
                        "{} is an HLS stream, which is not supported",
                        final_url
                    )));
                }
                ContentKind::NotAudio(content_type) => {
                    return Err(Error::connection(format!(
                        "{} does not serve audio (content-type {})",
                        final_url, content_type
                    )));
                }
            }
        }
    }

    async fn request(&self, url: &Url) -> Result<Response> {
        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.settings.user_agent)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "identity")
            .header(CONNECTION, "close");
        if self.settings.enable_metadata {
            request = request.header("Icy-MetaData", "1");
        }

        let response =
            match tokio::time::timeout(self.settings.connection_timeout(), request.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return Err(Error::connection(format!("cannot reach {}: {}", url, e)))
                }
                Err(_) => {
                    return Err(Error::connection(format!(
                        "no response from {} within {:?}",
                        url,
                        self.settings.connection_timeout()
                    )))
                }
            };

        if !response.status().is_success() {
            return Err(Error::connection(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        Ok(response)
    }

    /// Reads a playlist body, bounded in size and time
    async fn read_playlist(&self, response: Response, url: &Url) -> Result<String> {
        let limit = self
            .settings
            .read_timeout()
            .unwrap_or_else(|| self.settings.connection_timeout());
        let mut body = response.bytes_stream();
        let mut text = Vec::new();

        let read = async {
            while let Some(chunk) = body
                .try_next()
                .await
                .map_err(|e| Error::connection(format!("cannot read playlist {}: {}", url, e)))?
            {
                if text.len() + chunk.len() > MAX_PLAYLIST_BYTES {
                    return Err(Error::connection(format!(
                        "playlist {} is larger than {} bytes",
                        url, MAX_PLAYLIST_BYTES
                    )));
                }
                text.extend_from_slice(&chunk);
            }
            Ok::<(), Error>(())
        };

        tokio::time::timeout(limit, read).await.map_err(|_| {
            Error::connection(format!("playlist {} not read within {:?}", url, limit))
        })??;

        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    fn resolve_metaint(
        &self,
        url: &Url,
        headers: &IcyHeaders,
        require_metaint: bool,
    ) -> Result<usize> {
        if !self.settings.enable_metadata {
            return Ok(0);
        }

        let problem = match &headers.metaint {
            MetaInt::Value(n) if *n > 0 => return Ok(*n),
            MetaInt::Value(_) => "icy-metaint is 0".to_string(),
            MetaInt::Missing => "no icy-metaint header".to_string(),
            MetaInt::Invalid(raw) => format!("invalid icy-metaint {:?}", raw),
        };

        if require_metaint {
            Err(Error::connection(format!("{}: {}", url, problem)))
        } else {
            warn!("{}: {}, reading the stream as plain audio", url, problem);
            Ok(0)
        }
    }
}

/// Parses a stream URL, accepting only `http` and `https`
pub fn parse_stream_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::connection(format!(
            "unsupported scheme {:?} in {}",
            other, url
        ))),
    }
}

fn response_body(response: Response) -> BoxedBody {
    let stream = response.bytes_stream().map_err(std::io::Error::other);
    Box::new(StreamReader::new(Box::pin(stream)))
}

/// An open stream connection, positioned on the first audio byte
pub struct IcySession {
    url: Url,
    final_url: Url,
    headers: IcyHeaders,
    metaint: usize,
    body: BoxedBody,
    guard: ConnectionGuard,
    settings: IcySettings,
}

impl IcySession {
    /// Wraps a body obtained by other means (custom transport, tests)
    ///
    /// `metaint` is the interval to demultiplex, 0 for plain audio.
    pub fn from_reader<R>(
        url: Url,
        headers: IcyHeaders,
        metaint: usize,
        body: R,
        settings: IcySettings,
        stats: &Arc<SessionStats>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let guard = stats.open_connection(url.as_str());
        Self {
            final_url: url.clone(),
            url,
            headers,
            metaint,
            body: Box::new(body),
            guard,
            settings,
        }
    }

    /// URL the session was opened with
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL actually streamed, after redirects and playlists
    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    pub fn headers(&self) -> &IcyHeaders {
        &self.headers
    }

    pub fn metaint(&self) -> usize {
        self.metaint
    }

    /// Whether the stream interleaves metadata blocks
    pub fn has_metadata(&self) -> bool {
        self.metaint > 0
    }

    /// Turns the session into a stream of demultiplexed frames
    pub fn frames(self) -> IcyStream {
        let demuxer = IcyDemuxer::new(self.metaint).strict(self.settings.strict_metadata);
        IcyStream::new(
            self.body,
            demuxer,
            self.guard,
            self.settings.read_timeout(),
            self.settings.read_buffer_size,
        )
    }

    /// Closes the connection
    pub fn disconnect(self) {
        self.guard.release();
        debug!("Disconnected from {}", self.final_url);
    }
}

impl std::fmt::Debug for IcySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcySession")
            .field("url", &self.url)
            .field("final_url", &self.final_url)
            .field("metaint", &self.metaint)
            .field("headers", &self.headers)
            .finish()
    }
}
