//! High-level entry point
//!
//! [`IcyClient`] bundles a connector with its settings and spawns sessions.

use crate::connector::{IcyConnector, IcySession};
use crate::error::Result;
use crate::settings::IcySettings;
use crate::reader::AudioReader;
use crate::sink::{AudioSink, ChannelSink};
use crate::worker::SessionHandle;
use std::time::Duration;

/// Client for ICY streams
#[derive(Debug, Clone)]
pub struct IcyClient {
    connector: IcyConnector,
}

impl IcyClient {
    /// Client with the default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(IcySettings::default())
    }

    pub fn with_settings(settings: IcySettings) -> Result<Self> {
        Ok(Self {
            connector: IcyConnector::new(settings)?,
        })
    }

    /// Client with the settings stored in the `sources.icy` section of the
    /// configuration
    #[cfg(feature = "pmoconfig")]
    pub fn from_config(config: &pmoconfig::Config) -> Result<Self> {
        Self::with_settings(IcySettings::from_config(config)?)
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn settings(&self) -> &IcySettings {
        self.connector.settings()
    }

    pub fn connector(&self) -> &IcyConnector {
        &self.connector
    }

    /// Opens a connection without starting a worker
    pub async fn connect(&self, url: &str) -> Result<IcySession> {
        self.connector.connect(url).await
    }

    /// Channel sink sized with `audio_queue_capacity`
    pub fn channel_sink(&self) -> (ChannelSink, AudioReader) {
        ChannelSink::new(self.settings().audio_queue_capacity)
    }

    /// Starts a session streaming `url` into `sink`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: AudioSink>(&self, url: impl Into<String>, sink: S) -> SessionHandle {
        SessionHandle::spawn(self.connector.clone(), url.into(), sink)
    }
}

/// Builder for [`IcyClient`]
#[derive(Debug, Default)]
pub struct ClientBuilder {
    settings: IcySettings,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn settings(mut self, settings: IcySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn enable_metadata(mut self, enable: bool) -> Self {
        self.settings.enable_metadata = enable;
        self
    }

    pub fn require_metaint(mut self, require: bool) -> Self {
        self.settings.require_metaint = require;
        self
    }

    pub fn strict_metadata(mut self, strict: bool) -> Self {
        self.settings.strict_metadata = strict;
        self
    }

    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.settings.auto_reconnect = enable;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.settings.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// `None` disables the read timeout
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.read_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.settings.follow_redirects = follow;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.settings.read_buffer_size = size;
        self
    }

    pub fn audio_queue_capacity(mut self, capacity: usize) -> Self {
        self.settings.audio_queue_capacity = capacity;
        self
    }

    /// Uses a preconfigured HTTP client instead of building one
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<IcyClient> {
        let connector = match self.http_client {
            Some(client) => IcyConnector::with_client(client, self.settings),
            None => IcyConnector::new(self.settings)?,
        };
        Ok(IcyClient { connector })
    }
}
