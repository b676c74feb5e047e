//! Error types for the ICY stream client

/// Result type alias for ICY stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while connecting to or reading an ICY stream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Endpoint unreachable, not audio, or missing the expected ICY headers
    #[error("Connection error: {0}")]
    Connection(String),

    /// Metadata framing violated: the stream is no longer aligned on the interval
    #[error("Stream desync: {0}")]
    Desync(String),

    /// Malformed metadata tag text
    #[error("Metadata decode error: {0}")]
    Decode(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No data received within the read timeout
    #[error("Read timeout")]
    Timeout,

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used when a session failure is reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Desync,
    Decode,
    Other,
}

impl Error {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a desync error
    pub fn desync(msg: impl Into<String>) -> Self {
        Self::Desync(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Maps the error onto the connection / desync / decode taxonomy.
    ///
    /// Transport failures (HTTP, URL, timeout) count as connection errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::Http(_) | Error::InvalidUrl(_) | Error::Timeout => {
                ErrorKind::Connection
            }
            Error::Desync(_) => ErrorKind::Desync,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Io(_) | Error::Config(_) | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the worker may reconnect after this error.
    ///
    /// Framing and tag errors come from the server's data, not the transport,
    /// so a new connection would not fix them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Http(_) | Error::Timeout | Error::Connection(_)
        )
    }
}
