//! Runtime configuration for the model server and the dialog broker.
//!
//! Nothing here is persisted; the binary fills these from its command line.

use std::path::PathBuf;
use std::time::Duration;

/// First port probed by the model server.
pub const DEFAULT_START_PORT: u16 = 8765;
/// Number of consecutive ports probed (8765..=8774).
pub const DEFAULT_PORT_SPAN: u16 = 10;
/// Model files are streamed in chunks of this size.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Files above this size need an explicit confirmation before loading.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 500 * 1024 * 1024;

/// Configuration for the HTTP model server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub start_port: u16,
    pub port_span: u16,
    /// Directory holding the renderer's static front-end files.
    pub asset_root: PathBuf,
    pub chunk_size: usize,
    /// How long `start` waits for the serving thread to confirm.
    pub start_timeout: Duration,
    /// Connectivity probe attempts used by readiness checks.
    pub ready_attempts: u32,
    pub ready_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            start_port: DEFAULT_START_PORT,
            port_span: DEFAULT_PORT_SPAN,
            asset_root: PathBuf::from("viewer"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            start_timeout: Duration::from_secs(3),
            ready_attempts: 20,
            ready_interval: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            ..Self::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn ports(mut self, start_port: u16, port_span: u16) -> Self {
        self.start_port = start_port;
        self.port_span = port_span;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Ports probed on startup, in order. Never wraps past `u16::MAX`.
    pub fn candidate_ports(&self) -> impl Iterator<Item = u16> {
        let start = self.start_port;
        let end = start.saturating_add(self.port_span.saturating_sub(1));
        let span = self.port_span;
        (start..=end).take(span as usize)
    }
}

/// Configuration for the cross-thread dialog broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a requesting thread waits for the UI thread.
    pub request_timeout: Duration,
    /// Interval between UI-thread ticks.
    pub tick_interval: Duration,
    pub large_file_threshold: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            tick_interval: Duration::from_millis(100),
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl BrokerConfig {
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn large_file_threshold(mut self, bytes: u64) -> Self {
        self.large_file_threshold = bytes;
        self
    }
}
