//! # Link Packet Receiver
//!
//! Accumulates bytes from a [`Transport`] and hands out one validated
//! [`Packet`] per complete frame.
//!
//! Malformed input never surfaces as an error. Oversized lengths and CRC
//! mismatches drop the offending sync byte and scanning resumes from the
//! next candidate, so a glitch on the wire costs at most the frames it
//! touched.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use super::crc::crc8_dvb_s2;
use super::protocol::*;
use crate::error::Result;
use crate::transport::Transport;

/// Accumulation buffer size. Holds at least three maximum-size frames.
pub const RX_BUFFER_SIZE: usize = 128;

/// Running counters for link health
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Frames that passed validation
    pub frames_received: u64,
    /// Frames rejected for bad length or CRC
    pub frames_dropped: u64,
    /// Bytes skipped while hunting for a sync byte
    pub bytes_discarded: u64,
}

/// Incremental frame receiver
#[derive(Debug)]
pub struct PacketReceiver {
    buffer: BytesMut,
    stats: ReceiverStats,
}

impl Default for PacketReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketReceiver {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(RX_BUFFER_SIZE),
            stats: ReceiverStats::default(),
        }
    }

    /// Pull available bytes from the transport and return the next complete packet
    ///
    /// Never blocks: returns `Ok(None)` when no full frame is buffered yet.
    /// Partial frames are kept for the next call. At most one packet is
    /// returned per call; anything after it stays buffered.
    ///
    /// # Errors
    ///
    /// Only transport failures are returned. Bad frames are dropped silently.
    ///
    /// # Examples
    ///
    /// ```
    /// use flap_bridge::link::receiver::PacketReceiver;
    /// use flap_bridge::transport::Transport;
    ///
    /// struct Silent;
    ///
    /// impl Transport for Silent {
    ///     fn bytes_available(&mut self) -> flap_bridge::error::Result<usize> { Ok(0) }
    ///     fn read(&mut self, _: &mut [u8]) -> flap_bridge::error::Result<usize> { Ok(0) }
    ///     fn write(&mut self, _: &[u8]) -> flap_bridge::error::Result<()> { Ok(()) }
    /// }
    ///
    /// let mut receiver = PacketReceiver::new();
    /// assert!(receiver.poll(&mut Silent)?.is_none());
    /// # Ok::<(), flap_bridge::error::FlapError>(())
    /// ```
    pub fn poll<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<Packet>> {
        self.fill(transport)?;
        Ok(self.extract())
    }

    /// Bytes received but not yet consumed as part of a packet
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop all buffered bytes and wait for the next frame start
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    fn fill<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        let free = RX_BUFFER_SIZE - self.buffer.len();
        let wanted = transport.bytes_available()?.min(free);
        if wanted == 0 {
            return Ok(());
        }

        let mut chunk = [0u8; RX_BUFFER_SIZE];
        let n = transport.read(&mut chunk[..wanted])?;
        self.buffer.extend_from_slice(&chunk[..n]);
        trace!("Buffered {} bytes ({} pending)", n, self.buffer.len());

        Ok(())
    }

    fn extract(&mut self) -> Option<Packet> {
        loop {
            match self.buffer.iter().position(|&b| b == LINK_SYNC_BYTE) {
                Some(0) => {}
                Some(skip) => {
                    self.discard(skip);
                }
                None => {
                    let skip = self.buffer.len();
                    self.discard(skip);
                    return None;
                }
            }

            if self.buffer.len() < LINK_HEADER_SIZE {
                return None;
            }

            let payload_len = self.buffer[3] as usize;
            if payload_len > PAYLOAD_CAPACITY {
                warn!("Dropping frame: payload length {} exceeds {}", payload_len, PAYLOAD_CAPACITY);
                self.reject();
                continue;
            }

            let frame_len = LINK_FRAME_OVERHEAD + payload_len;
            if self.buffer.len() < frame_len {
                return None;
            }

            let received_crc = self.buffer[frame_len - 1];
            let calculated_crc = crc8_dvb_s2(&self.buffer[1..frame_len - 1]);
            if received_crc != calculated_crc {
                warn!(
                    "Dropping frame: CRC mismatch (expected 0x{:02X}, got 0x{:02X})",
                    calculated_crc, received_crc
                );
                self.reject();
                continue;
            }

            let frame = self.buffer.split_to(frame_len);
            match Packet::new(frame[1], frame[2], &frame[LINK_HEADER_SIZE..frame_len - 1]) {
                Ok(packet) => {
                    self.stats.frames_received += 1;
                    debug!("Received {:?}", packet);
                    return Some(packet);
                }
                Err(e) => {
                    warn!("Dropping frame: {}", e);
                    self.stats.frames_dropped += 1;
                }
            }
        }
    }

    /// Skip a bad sync byte so scanning resumes after it
    fn reject(&mut self) {
        self.buffer.advance(1);
        self.stats.frames_dropped += 1;
    }

    fn discard(&mut self, count: usize) {
        if count > 0 {
            trace!("Discarding {} bytes of line noise", count);
            self.buffer.advance(count);
            self.stats.bytes_discarded += count as u64;
        }
    }
}
