//! Session statistics
//!
//! Counters shared between the connector, the frame stream and the session
//! worker. Each opened connection is matched by exactly one release, which
//! [`ConnectionGuard`] enforces.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Statistics of one ICY session (all its connections included)
#[derive(Debug)]
pub struct SessionStats {
    /// Instant de création de la session
    pub start_time: Instant,

    /// Connexions HTTP ouvertes (reconnexions comprises)
    pub connections_opened: AtomicU64,

    /// Connexions HTTP libérées
    pub connections_released: AtomicU64,

    /// Octets audio transmis au pipeline
    pub audio_bytes: AtomicU64,

    /// Blocs de métadonnées non vides
    pub metadata_blocks: AtomicU64,

    /// Reconnexions réussies
    pub reconnects: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            connections_opened: AtomicU64::new(0),
            connections_released: AtomicU64::new(0),
            audio_bytes: AtomicU64::new(0),
            metadata_blocks: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        })
    }

    pub fn record_audio(&self, bytes: usize) {
        self.audio_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_metadata(&self) {
        self.metadata_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Acquire)
    }

    pub fn released(&self) -> u64 {
        self.connections_released.load(Ordering::Acquire)
    }

    /// Connections opened and not yet released
    pub fn open_connections(&self) -> u64 {
        self.opened().saturating_sub(self.released())
    }

    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes.load(Ordering::Relaxed)
    }

    pub fn metadata_blocks(&self) -> u64 {
        self.metadata_blocks.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Registers a new connection; dropping the guard releases it
    pub fn open_connection(self: &Arc<Self>, url: impl Into<String>) -> ConnectionGuard {
        self.connections_opened.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            stats: Arc::clone(self),
            url: url.into(),
            released: AtomicBool::new(false),
        }
    }

    /// Retourne un rapport formaté des statistiques
    pub fn report(&self) -> String {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let bytes = self.audio_bytes();
        let kbps = if elapsed > 0.0 {
            bytes as f64 * 8.0 / 1000.0 / elapsed
        } else {
            0.0
        };

        format!(
            "elapsed={:.1}s audio={} bytes ({:.1} kbps) blocks={} connections={}/{} reconnects={}",
            elapsed,
            bytes,
            kbps,
            self.metadata_blocks(),
            self.released(),
            self.opened(),
            self.reconnects(),
        )
    }
}

/// Keeps one connection accounted as open
#[derive(Debug)]
pub struct ConnectionGuard {
    stats: Arc<SessionStats>,
    url: String,
    released: AtomicBool,
}

impl ConnectionGuard {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Releases the connection. Later calls, and the drop, do nothing.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.stats
                .connections_released
                .fetch_add(1, Ordering::AcqRel);
            debug!(url = %self.url, "ICY connection released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
