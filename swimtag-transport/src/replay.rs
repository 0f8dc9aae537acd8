//! Replay transport for captured or synthetic byte streams
//!
//! Serves a script of chunks, idle periods and a final close through the
//! same [`Transport`] interface as the TCP link, so the decode loop can be
//! driven from a raw capture file or from a test.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::{error::*, Transport};

/// One scripted transport outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStep {
    /// Deliver these bytes
    Data(Bytes),

    /// Nothing arrives within the read timeout
    Idle,

    /// Remote closes the connection
    Close,
}

/// Scripted transport
pub struct ReplayTransport {
    name: String,
    steps: VecDeque<ReplayStep>,
    connected: bool,
    /// Wait out the read timeout on `Idle` instead of returning at once
    pace: bool,
}

impl ReplayTransport {
    /// Create from explicit steps
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            name: "replay".to_string(),
            steps: steps.into_iter().collect(),
            connected: false,
            pace: false,
        }
    }

    /// Deliver `bytes` in chunks of `chunk_size`, then close
    pub fn from_bytes(bytes: impl Into<Bytes>, chunk_size: usize) -> Self {
        let bytes: Bytes = bytes.into();
        let chunk_size = chunk_size.max(1);

        let mut steps: Vec<ReplayStep> = (0..bytes.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(bytes.len());
                ReplayStep::Data(bytes.slice(start..end))
            })
            .collect();
        steps.push(ReplayStep::Close);

        Self::new(steps)
    }

    /// Replay a raw capture of the reader's TCP stream
    pub fn from_file(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        info!("Loaded capture {}: {} bytes", path.display(), bytes.len());

        let mut transport = Self::from_bytes(bytes, chunk_size);
        transport.name = path.display().to_string();
        Ok(transport)
    }

    /// Sleep for the read timeout on idle steps
    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    /// Steps not yet consumed
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }

        debug!("Replay {} started ({} steps)", self.name, self.steps.len());
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn receive(&mut self, read_timeout: Duration) -> Result<BytesMut> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.steps.pop_front() {
            Some(ReplayStep::Data(bytes)) => Ok(BytesMut::from(&bytes[..])),
            Some(ReplayStep::Idle) => {
                if self.pace {
                    tokio::time::sleep(read_timeout).await;
                }
                Err(Error::ReadTimeout)
            }
            Some(ReplayStep::Close) | None => {
                debug!("Replay {} exhausted", self.name);
                self.connected = false;
                Err(Error::ConnectionClosed)
            }
        }
    }

    fn remote_addr(&self) -> String {
        self.name.clone()
    }
}
