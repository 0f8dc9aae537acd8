//! Reader connection and decode loop

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swimtag_core::{DecoderStats, FrameDecoder, FrameEvent, TagExtractor};
use swimtag_transport::{TcpTransport, Transport};

use crate::config::ReaderConfig;
use crate::error::{Error, Result};

/// Why [`Reader::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired
    Cancelled,

    /// The reader closed the connection
    ConnectionClosed,

    /// The configured run duration elapsed
    DurationElapsed,
}

/// R300/YRM200 reader
///
/// Owns the byte source and turns it into [`FrameEvent`]s. One reader is
/// the only producer for its connection.
///
/// # Examples
///
/// ```no_run
/// use swimtag::{ArrivalRegister, Reader, ReaderConfig};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> swimtag::Result<()> {
///     let mut reader = Reader::new(&ReaderConfig::default());
///     reader.connect().await?;
///
///     let register = ArrivalRegister::new();
///     register.establish_point_zero()?;
///
///     let cancel = CancellationToken::new();
///     reader
///         .run(&cancel, |event| {
///             for tag in event.events() {
///                 let _ = register.register_arrival(tag);
///             }
///         })
///         .await?;
///
///     println!("{} arrivals", register.finalize().len());
///     Ok(())
/// }
/// ```
pub struct Reader {
    transport: Box<dyn Transport>,
    decoder: FrameDecoder,
    extractor: TagExtractor,
    read_timeout: Duration,
    duration: Option<Duration>,
}

impl Reader {
    /// Create a reader over TCP
    pub fn new(config: &ReaderConfig) -> Self {
        let transport = TcpTransport::new(config.host.clone(), config.port)
            .with_connect_timeout(config.connect_timeout());
        Self::with_transport(Box::new(transport), config)
    }

    /// Create a reader over any transport
    pub fn with_transport(transport: Box<dyn Transport>, config: &ReaderConfig) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(config.checksum),
            extractor: TagExtractor::new(config.extractor()),
            read_timeout: config.read_timeout(),
            duration: None,
        }
    }

    /// Stop [`Reader::run`] after `duration`
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Decoder diagnostics
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Connect to the reader
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}...", self.transport.remote_addr());
        self.transport.connect().await?;
        self.decoder.reset();
        Ok(())
    }

    /// Disconnect from the reader
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            return Ok(());
        }

        self.transport.disconnect().await?;
        info!("Disconnected from {}", self.transport.remote_addr());
        Ok(())
    }

    /// Read and decode until cancelled, closed or out of time
    ///
    /// Every decoded frame is passed to `on_event` in wire order. A read
    /// timeout only re-checks cancellation. The transport is disconnected
    /// before returning.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when called before [`Reader::connect`], and
    /// transport errors other than timeouts and orderly close.
    pub async fn run<F>(&mut self, cancel: &CancellationToken, mut on_event: F) -> Result<StopReason>
    where
        F: FnMut(FrameEvent),
    {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let deadline = self.duration.map(|d| Instant::now() + d);

        info!("Reading tags from {}", self.transport.remote_addr());

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let read_timeout = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        break StopReason::DurationElapsed;
                    }
                    self.read_timeout.min(left)
                }
                None => self.read_timeout,
            };

            let received = tokio::select! {
                _ = cancel.cancelled() => break StopReason::Cancelled,
                received = self.transport.receive(read_timeout) => received,
            };

            match received {
                Ok(bytes) => {
                    self.decoder.push(&bytes);
                    while let Some(frame) = self.decoder.next_frame() {
                        on_event(self.extractor.extract(&frame));
                    }
                }
                Err(e) if e.is_timeout() => continue,
                Err(swimtag_transport::Error::ConnectionClosed) => {
                    warn!("Reader closed the connection");
                    for frame in self.decoder.finish() {
                        on_event(self.extractor.extract(&frame));
                    }
                    break StopReason::ConnectionClosed;
                }
                Err(e) => {
                    let _ = self.transport.disconnect().await;
                    return Err(e.into());
                }
            }
        };

        if self.decoder.buffered() > 0 {
            debug!("Discarding {} undecoded bytes", self.decoder.buffered());
        }

        let stats = self.decoder.stats();
        info!(
            ?reason,
            frames = stats.frames,
            skipped_bytes = stats.skipped_bytes,
            checksum_failures = stats.checksum_failures,
            "Decode loop stopped"
        );

        self.disconnect().await?;
        Ok(reason)
    }

    /// Run the decode loop on its own task
    ///
    /// Events are handed over through an unbounded channel so a slow
    /// consumer never stalls the socket. Connects first when needed.
    pub fn spawn(
        mut self,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<FrameEvent>, JoinHandle<Result<StopReason>>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            if !self.is_connected() {
                self.connect().await?;
            }
            self.run(&cancel, |event| {
                // Receiver gone means nobody is listening any more
                let _ = tx.send(event);
            })
            .await
        });

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use swimtag_core::{ChecksumMode, Command, Frame};
    use swimtag_transport::{ReplayStep, ReplayTransport};

    use crate::ArrivalRegister;

    fn tag_frame(last_epc_byte: u8, rssi: u8) -> Bytes {
        let mut data = vec![0x01, 0x30, 0x00, 0xE2, 0x80, 0x11, 0x90, 0, 0, 0, 0, 0, 0, 0];
        data.push(last_epc_byte);
        data.push(rssi);
        Frame::with_data(0x01, Command::RealTimeInventory, data)
            .encode(ChecksumMode::Xor)
            .unwrap()
            .freeze()
    }

    fn reader(steps: Vec<ReplayStep>) -> Reader {
        Reader::with_transport(Box::new(ReplayTransport::new(steps)), &ReaderConfig::default())
    }

    #[tokio::test]
    async fn test_run_requires_connection() {
        let mut reader = reader(vec![]);
        let result = reader.run(&CancellationToken::new(), |_| {}).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_run_registers_across_chunks() {
        let first = tag_frame(0x01, 0x48);
        let second = tag_frame(0x02, 0x50);
        let mut wire = first.to_vec();
        wire.extend_from_slice(&second);

        let mut reader = Reader::with_transport(
            Box::new(ReplayTransport::from_bytes(wire, 7)),
            &ReaderConfig::default(),
        );
        reader.connect().await.unwrap();

        let register = ArrivalRegister::new();
        let reason = reader
            .run(&CancellationToken::new(), |event| {
                for tag in event.events() {
                    register.register_arrival(tag).unwrap();
                }
            })
            .await
            .unwrap();

        assert_eq!(reason, StopReason::ConnectionClosed);
        assert!(!reader.is_connected());

        let arrivals = register.finalize().arrivals;
        assert_eq!(arrivals.len(), 2);
        assert_eq!(arrivals[0].epc.as_str(), "E28011900000000000000001");
        assert_eq!(arrivals[0].antenna, 1);
        assert_eq!(arrivals[0].rssi, -57);
        assert_eq!(arrivals[1].epc.as_str(), "E28011900000000000000002");
        assert_eq!(reader.stats().frames, 2);
    }

    #[tokio::test]
    async fn test_close_flushes_frames_held_by_stray_marker() {
        let mut wire = vec![0xA0, 0xF0];
        wire.extend_from_slice(&tag_frame(0x01, 0x48));
        wire.extend_from_slice(&tag_frame(0x02, 0x48));

        let mut reader = reader(vec![ReplayStep::Data(Bytes::from(wire)), ReplayStep::Close]);
        reader.connect().await.unwrap();

        let mut epcs = Vec::new();
        let reason = reader
            .run(&CancellationToken::new(), |event| {
                epcs.extend(event.events().iter().map(|tag| tag.epc.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(reason, StopReason::ConnectionClosed);
        assert_eq!(epcs, vec!["E28011900000000000000001", "E28011900000000000000002"]);
        assert_eq!(reader.stats().frames, 2);
    }

    #[tokio::test]
    async fn test_idle_reads_are_not_errors() {
        let mut reader = reader(vec![
            ReplayStep::Idle,
            ReplayStep::Data(tag_frame(0x01, 0x48)),
            ReplayStep::Idle,
            ReplayStep::Idle,
            ReplayStep::Close,
        ]);
        reader.connect().await.unwrap();

        let mut count = 0;
        let reason = reader
            .run(&CancellationToken::new(), |event| count += event.events().len())
            .await
            .unwrap();

        assert_eq!(reason, StopReason::ConnectionClosed);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_garbage_between_frames_is_skipped() {
        let mut wire = vec![0x00, 0xFF, 0x13];
        wire.extend_from_slice(&tag_frame(0x01, 0x48));
        wire.extend_from_slice(&[0x13, 0x37]);
        wire.extend_from_slice(&tag_frame(0x02, 0x48));

        let mut reader = Reader::with_transport(
            Box::new(ReplayTransport::from_bytes(wire, 5)),
            &ReaderConfig::default(),
        );
        reader.connect().await.unwrap();

        let mut epcs = Vec::new();
        reader
            .run(&CancellationToken::new(), |event| {
                epcs.extend(event.into_events().into_iter().map(|e| e.epc.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(epcs, vec!["E28011900000000000000001", "E28011900000000000000002"]);
    }

    #[tokio::test]
    async fn test_non_inventory_frames_pass_through() {
        let other = Frame::with_data(0x01, Command::Other(0x72), vec![0x01, 0x02])
            .encode(ChecksumMode::Xor)
            .unwrap()
            .freeze();
        let mut reader = reader(vec![ReplayStep::Data(other), ReplayStep::Close]);
        reader.connect().await.unwrap();

        let mut others = Vec::new();
        reader
            .run(&CancellationToken::new(), |event| {
                if let FrameEvent::Other(frame) = event {
                    others.push(frame.command);
                }
            })
            .await
            .unwrap();

        assert_eq!(others, vec![Command::Other(0x72)]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut reader = reader(vec![ReplayStep::Data(tag_frame(0x01, 0x48))]);
        reader.connect().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut count = 0;
        let reason = reader.run(&cancel, |_| count += 1).await.unwrap();
        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(count, 0);
        assert!(!reader.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle() {
        let transport = ReplayTransport::new(vec![ReplayStep::Idle; 100]).with_pacing(true);
        let mut reader = Reader::with_transport(Box::new(transport), &ReaderConfig::default());
        reader.connect().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            trigger.cancel();
        });

        let reason = reader.run(&cancel, |_| {}).await.unwrap();
        assert_eq!(reason, StopReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_elapsed() {
        let transport = ReplayTransport::new(vec![ReplayStep::Idle; 100]).with_pacing(true);
        let mut reader = Reader::with_transport(Box::new(transport), &ReaderConfig::default())
            .with_duration(Duration::from_secs(2));
        reader.connect().await.unwrap();

        let started = Instant::now();
        let reason = reader.run(&CancellationToken::new(), |_| {}).await.unwrap();

        assert_eq!(reason, StopReason::DurationElapsed);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_spawn_delivers_events() {
        let reader = reader(vec![
            ReplayStep::Data(tag_frame(0x01, 0x48)),
            ReplayStep::Data(tag_frame(0x01, 0x48)),
            ReplayStep::Close,
        ]);

        let (mut events, handle) = reader.spawn(CancellationToken::new());

        let register = ArrivalRegister::new();
        while let Some(event) = events.recv().await {
            for tag in event.events() {
                register.register_arrival(tag).unwrap();
            }
        }

        assert_eq!(handle.await.unwrap().unwrap(), StopReason::ConnectionClosed);
        assert_eq!(register.len(), 1);
    }
}
