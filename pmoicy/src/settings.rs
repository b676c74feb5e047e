//! Runtime settings of the ICY client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "pmoicy/0.1.0";

/// Default connection timeout (10 seconds)
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Default read timeout (30 seconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Default number of consecutive reconnection attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before each reconnection attempt
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default size of a single read on the connection
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default capacity of the audio queue between the session worker and the pipeline
pub const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 32;

/// Settings shared by the connector, the demuxer and the session worker
///
/// Can be deserialized from the `sources.icy` section of the configuration,
/// or built with [`IcySettings::from_config`] when the `pmoconfig` feature is
/// enabled. Missing fields take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcySettings {
    /// Send `Icy-MetaData: 1` and demultiplex metadata blocks
    pub enable_metadata: bool,
    /// Fail the connection when metadata was requested but `icy-metaint` is missing
    pub require_metaint: bool,
    /// Fail the session on malformed tag text instead of skipping the block
    pub strict_metadata: bool,
    /// Reconnect after end of stream or I/O errors
    pub auto_reconnect: bool,
    /// Consecutive reconnection attempts before giving up
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
    /// 0 disables the read timeout
    pub read_timeout_ms: u64,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub read_buffer_size: usize,
    pub audio_queue_capacity: usize,
}

impl Default for IcySettings {
    fn default() -> Self {
        Self {
            enable_metadata: true,
            require_metaint: true,
            strict_metadata: false,
            auto_reconnect: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            audio_queue_capacity: DEFAULT_AUDIO_QUEUE_CAPACITY,
        }
    }
}

impl IcySettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// `None` when the read timeout is disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
