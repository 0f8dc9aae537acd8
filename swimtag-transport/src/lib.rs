//! Transport layer for the reader protocol
//!
//! Provides the TCP link to the reader and a replay transport that feeds
//! recorded or synthetic byte streams.

pub mod error;
pub mod replay;
pub mod tcp;

pub use error::{Error, Result};
pub use replay::{ReplayStep, ReplayTransport};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte source the decode loop reads from
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to reader
    async fn connect(&mut self) -> Result<()>;
    
    /// Disconnect from reader
    async fn disconnect(&mut self) -> Result<()>;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Receive whatever bytes are available
    ///
    /// Returns [`Error::ReadTimeout`] when nothing arrives within `timeout`
    /// and [`Error::ConnectionClosed`] on an orderly close.
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}
