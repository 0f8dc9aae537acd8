//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{error::*, Transport};

/// Bytes requested per read
const READ_CHUNK: usize = 4096;

/// Connect timeout used until one is configured
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP link to one R300/YRM200 reader
///
/// The reader pushes inventory frames on its own once the TCP session is
/// open, so the link is read-only. Any read error other than a timeout
/// leaves it disconnected.
pub struct TcpTransport {
    target: String,
    peer: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            target: format!("{}:{}", host.as_ref(), port),
            peer: None,
            stream: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound on the whole connect attempt, lookup included
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Try each resolved address in turn
    async fn open(&self) -> Result<TcpStream> {
        let addrs = tokio::net::lookup_host(&self.target)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", self.target, e)))?;

        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to reader at {}", addr);
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => Error::Io(e),
            None => Error::InvalidAddress(format!("No addresses found for {}", self.target)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let stream = timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| Error::ConnectionTimeout)??;

        stream.set_nodelay(true)?;
        self.peer = stream.peer_addr().ok();

        info!("Connected to reader at {}", self.remote_addr());

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing link to {}", self.remote_addr());
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn receive(&mut self, read_timeout: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(READ_CHUNK);

        let read = match timeout(read_timeout, stream.read_buf(&mut buf)).await {
            Ok(read) => read,
            Err(_) => return Err(Error::ReadTimeout),
        };

        match read {
            Ok(0) => {
                self.stream = None;
                Err(Error::ConnectionClosed)
            }
            Ok(n) => {
                trace!("Received {} bytes: {:02X?}", n, &buf[..n.min(16)]);
                Ok(buf)
            }
            Err(e) => {
                warn!("Read from {} failed: {}", self.remote_addr(), e);
                self.stream = None;
                Err(Error::Io(e))
            }
        }
    }

    /// Connected peer, or the configured target before the first connect
    fn remote_addr(&self) -> String {
        self.peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.target.clone())
    }
}
