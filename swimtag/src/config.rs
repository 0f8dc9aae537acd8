//! Reader configuration
//!
//! Values come from, lowest precedence first: defaults, a JSON file,
//! environment variables, then explicit setters (the CLI).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use swimtag_core::{
    constants::{tag::DEFAULT_EPC_LEN, tag::DEFAULT_RSSI_OFFSET, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS},
    BufferedLayout, ChecksumMode, ExtractorConfig, DEFAULT_PORT,
};

use crate::error::{Error, Result};

/// Reader address override
pub const ENV_READER_IP: &str = "SWIMTAG_READER_IP";

/// Reader port override
pub const ENV_READER_PORT: &str = "SWIMTAG_READER_PORT";

/// Factory address of the R300 reader
pub const DEFAULT_HOST: &str = "192.168.0.178";

/// Connection and decoding parameters for one reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Idle period after which the decode loop checks for cancellation
    pub read_timeout_ms: u64,
    pub checksum: ChecksumMode,
    /// EPC size in bytes
    pub epc_len: usize,
    pub rssi_offset: i16,
    pub antenna_base: u8,
    pub buffered_layout: BufferedLayout,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            checksum: ChecksumMode::default(),
            epc_len: DEFAULT_EPC_LEN,
            rssi_offset: DEFAULT_RSSI_OFFSET,
            antenna_base: 0,
            buffered_layout: BufferedLayout::default(),
        }
    }
}

impl ReaderConfig {
    /// Create config for a reader address, other values default
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Load from a JSON file; absent keys keep their defaults
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
        let config: Self = serde_json::from_str(&data)?;

        debug!("Loaded reader config from {}", path.display());

        config.validate()?;
        Ok(config)
    }

    /// Apply `SWIMTAG_READER_IP` / `SWIMTAG_READER_PORT` from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup(ENV_READER_IP).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }

        if let Some(port) = lookup(ENV_READER_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: {:?}", ENV_READER_PORT, port)))?;
        }

        Ok(self)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_rssi_offset(mut self, offset: i16) -> Self {
        self.rssi_offset = offset;
        self
    }

    pub fn with_antenna_base(mut self, base: u8) -> Self {
        self.antenna_base = base;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Extraction parameters derived from this config
    pub fn extractor(&self) -> ExtractorConfig {
        ExtractorConfig {
            epc_len: self.epc_len,
            rssi_offset: self.rssi_offset,
            antenna_base: self.antenna_base,
            buffered_layout: self.buffered_layout,
        }
    }

    /// Reject values the decode loop cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(Error::Config("read_timeout_ms must be positive".into()));
        }
        if self.epc_len == 0 || self.epc_len > 62 {
            return Err(Error::Config(format!("epc_len {} out of range 1..=62", self.epc_len)));
        }
        Ok(())
    }
}
