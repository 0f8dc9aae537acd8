//! Streaming frame decoder
//!
//! TCP delivers bytes with no regard for frame boundaries. [`FrameDecoder`]
//! buffers whatever arrives and hands out complete, checksum-valid frames:
//!
//! 1. Skip to the next marker byte.
//! 2. Wait until the declared frame is fully buffered.
//! 3. Verify the checksum. On a mismatch only the marker byte is dropped,
//!    since the marker may have been a stray 0xA0 inside unrelated data.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::{
    checksum::ChecksumMode,
    constants::{FRAME_MARKER, HEADER_SIZE, MAX_FRAME_SIZE, MIN_LENGTH},
    error::Error,
    frame::Frame,
};

/// Decoder diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Valid frames emitted
    pub frames: u64,

    /// Bytes discarded while resynchronizing
    pub skipped_bytes: u64,

    /// Candidates rejected by the checksum
    pub checksum_failures: u64,

    /// Candidates with an impossible LENGTH
    pub invalid_lengths: u64,
}

/// Incremental decoder turning a byte stream into frames
///
/// # Examples
///
/// ```
/// use swimtag_core::{ChecksumMode, Command, Frame, FrameDecoder};
///
/// let wire = Frame::with_data(1, Command::RealTimeInventory, vec![7; 4])
///     .encode(ChecksumMode::Xor)
///     .unwrap();
///
/// let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
/// decoder.push(&wire[..3]);
/// assert!(decoder.next_frame().is_none());
///
/// decoder.push(&wire[3..]);
/// assert_eq!(decoder.next_frame().unwrap().data.len(), 4);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    mode: ChecksumMode,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(mode: ChecksumMode) -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE * 4),
            mode,
            stats: DecoderStats::default(),
        }
    }

    pub fn mode(&self) -> ChecksumMode {
        self.mode
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        trace!("Buffered {} bytes: {:02X?}", bytes.len(), &bytes[..bytes.len().min(32)]);
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop buffered bytes, e.g. after a reconnect
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Iterate over the frames currently decodable
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Next valid frame, or `None` until more bytes are pushed
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if !self.sync() {
                return None;
            }

            if self.buf.len() < HEADER_SIZE {
                return None;
            }

            let length = self.buf[1];
            if length < MIN_LENGTH {
                self.stats.invalid_lengths += 1;
                debug!(length, "Impossible frame length, resynchronizing");
                self.skip(1);
                continue;
            }

            let total = HEADER_SIZE + length as usize;
            if self.buf.len() < total {
                return None;
            }

            match Frame::decode(&self.buf[..total], self.mode) {
                Ok(frame) => {
                    self.buf.advance(total);
                    self.stats.frames += 1;
                    trace!("Decoded {}", frame);
                    return Some(frame);
                }
                Err(Error::ChecksumMismatch { expected, received }) => {
                    self.stats.checksum_failures += 1;
                    if self.stats.checksum_failures == 1 {
                        warn!(
                            mode = self.mode.name(),
                            expected = format!("0x{:02X}", expected),
                            received = format!("0x{:02X}", received),
                            "First checksum mismatch on this link; check the configured checksum mode"
                        );
                    } else {
                        debug!(
                            expected = format!("0x{:02X}", expected),
                            received = format!("0x{:02X}", received),
                            "Checksum mismatch, resynchronizing"
                        );
                    }
                    self.skip(1);
                }
                Err(e) => {
                    debug!("Dropping candidate frame: {}", e);
                    self.skip(1);
                }
            }
        }
    }

    /// Frames still recoverable once the stream has ended
    ///
    /// A marker whose declared frame can no longer complete is dropped and
    /// the rest of the buffer rescanned. The buffer is empty afterwards.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.frames().collect();

        while !self.buf.is_empty() {
            debug!(buffered = self.buf.len(), "Dropping unterminated frame candidate");
            self.skip(1);
            frames.extend(self.frames());
        }

        frames
    }

    /// Discard bytes up to the next marker; false when none is buffered
    fn sync(&mut self) -> bool {
        match self.buf.iter().position(|&b| b == FRAME_MARKER) {
            Some(0) => true,
            Some(offset) => {
                debug!(skipped = offset, "Discarding bytes before frame marker");
                self.skip(offset);
                true
            }
            None => {
                if !self.buf.is_empty() {
                    debug!(skipped = self.buf.len(), "No frame marker in buffer");
                    let len = self.buf.len();
                    self.skip(len);
                }
                false
            }
        }
    }

    fn skip(&mut self, count: usize) {
        self.buf.advance(count);
        self.stats.skipped_bytes += count as u64;
    }
}

/// Iterator over decodable frames, see [`FrameDecoder::frames`]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn frame(reader_id: u8, command: u8, data: Vec<u8>) -> Frame {
        Frame::with_data(reader_id, Command::from(command), data)
    }

    fn wire(frames: &[Frame], mode: ChecksumMode) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|f| f.encode(mode).unwrap().to_vec())
            .collect()
    }

    fn decode_chunked(bytes: &[u8], cuts: &[usize], mode: ChecksumMode) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new(mode);
        let mut out = Vec::new();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
            let cut = cut.clamp(start, bytes.len());
            decoder.push(&bytes[start..cut]);
            out.extend(decoder.frames());
            start = cut;
        }
        out
    }

    #[test]
    fn test_back_to_back_frames() {
        let frames = vec![
            frame(1, 0x89, vec![1, 2, 3]),
            frame(1, 0x72, vec![]),
            frame(2, 0x90, vec![9; 30]),
        ];
        let bytes = wire(&frames, ChecksumMode::Xor);

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);
        let decoded: Vec<Frame> = decoder.frames().collect();

        assert_eq!(decoded, frames);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().frames, 3);
    }

    #[test]
    fn test_byte_at_a_time() {
        let frames = vec![frame(1, 0x89, vec![0xA0, 0xA0, 0x05]), frame(1, 0x8A, vec![4; 8])];
        let bytes = wire(&frames, ChecksumMode::Xor);
        let cuts: Vec<usize> = (1..bytes.len()).collect();

        assert_eq!(decode_chunked(&bytes, &cuts, ChecksumMode::Xor), frames);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let good = frame(1, 0x89, vec![1, 2, 3]);
        let mut bytes = vec![0x00, 0x13, 0x37, 0xFF];
        bytes.extend(wire(&[good.clone()], ChecksumMode::Xor));

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);

        assert_eq!(decoder.next_frame(), Some(good));
        assert_eq!(decoder.stats().skipped_bytes, 4);
    }

    #[test]
    fn test_garbage_without_marker_is_dropped() {
        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&[0x01, 0x02, 0x03]);

        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().skipped_bytes, 3);
    }

    #[test]
    fn test_partial_frame_waits() {
        let bytes = wire(&[frame(1, 0x89, vec![5; 10])], ChecksumMode::Xor);

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes[..bytes.len() - 1]);

        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), bytes.len() - 1);
        assert_eq!(decoder.stats().skipped_bytes, 0);
    }

    #[test]
    fn test_checksum_failure_drops_only_marker() {
        // Stray marker followed by a plausible length, then a real frame
        let good = frame(1, 0x89, vec![1, 2, 3]);
        let mut bytes = vec![0xA0, 0x04];
        bytes.extend(wire(&[good.clone()], ChecksumMode::Xor));

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);

        assert_eq!(decoder.next_frame(), Some(good));
        assert_eq!(decoder.stats().checksum_failures, 1);
    }

    #[test]
    fn test_impossible_length_resyncs() {
        let good = frame(1, 0x89, vec![]);
        let mut bytes = vec![0xA0, 0x01];
        bytes.extend(wire(&[good.clone()], ChecksumMode::Xor));

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);

        assert_eq!(decoder.next_frame(), Some(good));
        assert_eq!(decoder.stats().invalid_lengths, 1);
    }

    #[test]
    fn test_corrupt_frame_then_valid_frames() {
        let frames = vec![
            frame(1, 0x89, vec![0x10, 0x20, 0x30]),
            frame(1, 0x89, vec![0x11, 0x21, 0x31]),
            frame(1, 0x89, vec![0x12, 0x22, 0x32]),
        ];
        let mut bytes = wire(&frames, ChecksumMode::Xor);
        bytes[5] ^= 0x04;

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);
        let decoded: Vec<Frame> = decoder.frames().collect();

        assert_eq!(decoded, frames[1..].to_vec());
        assert_eq!(decoder.stats().checksum_failures, 1);
    }

    #[test]
    fn test_finish_recovers_frames_behind_stray_marker() {
        let frames = vec![frame(1, 0x89, vec![1, 2, 3]), frame(1, 0x72, vec![])];
        let mut bytes = vec![0xA0, 0xF0, 0x01];
        bytes.extend(wire(&frames, ChecksumMode::Xor));

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);
        assert!(decoder.next_frame().is_none());

        assert_eq!(decoder.finish(), frames);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().skipped_bytes, 3);
    }

    #[test]
    fn test_finish_drops_truncated_tail() {
        let complete = frame(1, 0x89, vec![1, 2, 3]);
        let mut bytes = wire(&[complete.clone()], ChecksumMode::Xor);
        let partial = wire(&[frame(1, 0x89, vec![4; 10])], ChecksumMode::Xor);
        bytes.extend_from_slice(&partial[..8]);

        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&bytes);

        assert_eq!(decoder.finish(), vec![complete]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut decoder = FrameDecoder::new(ChecksumMode::Xor);
        decoder.push(&[0xA0, 0x10, 0x01]);
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        let not_marker = any::<u8>().prop_filter("not a marker", |b| *b != FRAME_MARKER);
        (
            not_marker.clone(),
            not_marker.clone(),
            prop::collection::vec(not_marker, 0..40),
        )
            .prop_map(|(reader_id, command, data)| frame(reader_id, command, data))
    }

    fn arb_frame_with_markers() -> impl Strategy<Value = Frame> {
        let byte = prop_oneof![Just(FRAME_MARKER), any::<u8>()];
        (byte.clone(), byte.clone(), prop::collection::vec(byte, 0..40))
            .prop_map(|(reader_id, command, data)| frame(reader_id, command, data))
    }

    proptest! {
        #[test]
        fn chunking_never_changes_output(
            frames in prop::collection::vec(arb_frame_with_markers(), 1..12),
            mut cuts in prop::collection::vec(0usize..600, 0..20),
        ) {
            let bytes = wire(&frames, ChecksumMode::Xor);
            cuts.sort_unstable();

            let decoded = decode_chunked(&bytes, &cuts, ChecksumMode::Xor);
            prop_assert_eq!(decoded, frames);
        }

        #[test]
        fn single_bit_flip_drops_only_that_frame(
            frames in prop::collection::vec(arb_frame(), 2..8),
            victim in any::<prop::sample::Index>(),
            byte in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mode = ChecksumMode::Xor;
            let victim = victim.index(frames.len());
            prop_assume!(!frames[victim].data.is_empty());
            // A checksum byte equal to the marker would open a spurious candidate
            prop_assume!(frames.iter().all(|f| f.checksum(mode) != FRAME_MARKER));

            let offset: usize = frames[..victim].iter().map(Frame::size).sum();
            let index = offset + 4 + byte.index(frames[victim].data.len());

            let mut bytes = wire(&frames, mode);
            bytes[index] ^= 1 << bit;
            prop_assume!(bytes[index] != FRAME_MARKER);

            let mut decoder = FrameDecoder::new(mode);
            decoder.push(&bytes);
            let decoded: Vec<Frame> = decoder.frames().collect();

            let mut expected = frames.clone();
            expected.remove(victim);
            prop_assert_eq!(decoded, expected);
            prop_assert_eq!(decoder.stats().checksum_failures, 1);
        }
    }
}
