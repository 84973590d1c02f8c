//! # Link Protocol Constants and Types
//!
//! Frame layout:
//!
//! ```text
//! sync(1) | source(1) | destination(1) | len(1) | payload(len) | crc(1)
//! ```
//!
//! The CRC covers source, destination, len and payload.

use std::fmt;

use crate::error::{FlapError, Result};

/// Frame sync byte
pub const LINK_SYNC_BYTE: u8 = 0xA5;

/// Fixed payload capacity of a [`Packet`]
pub const PAYLOAD_CAPACITY: usize = 30;

/// Bytes before the payload: sync + source + destination + len
pub const LINK_HEADER_SIZE: usize = 4;

/// Non-payload bytes in a frame: header + crc
pub const LINK_FRAME_OVERHEAD: usize = LINK_HEADER_SIZE + 1;

/// Largest valid frame on the wire
pub const LINK_MAX_FRAME_SIZE: usize = LINK_FRAME_OVERHEAD + PAYLOAD_CAPACITY;

/// A validated packet received over the link.
///
/// The payload lives in a fixed buffer; only the first `payload_len`
/// bytes are meaningful.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub source: u8,
    pub destination: u8,
    payload: [u8; PAYLOAD_CAPACITY],
    payload_len: usize,
}

impl Packet {
    /// Create a packet, copying `payload` into the fixed buffer
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds [`PAYLOAD_CAPACITY`] (30 bytes)
    ///
    /// # Examples
    ///
    /// ```
    /// use flap_bridge::link::protocol::Packet;
    ///
    /// let packet = Packet::new(b'N', b'F', b"O")?;
    /// assert_eq!(packet.payload(), b"O");
    /// # Ok::<(), flap_bridge::error::FlapError>(())
    /// ```
    pub fn new(source: u8, destination: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > PAYLOAD_CAPACITY {
            return Err(FlapError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                PAYLOAD_CAPACITY
            )));
        }

        let mut buffer = [0u8; PAYLOAD_CAPACITY];
        buffer[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            source,
            destination,
            payload: buffer,
            payload_len: payload.len(),
        })
    }

    /// The meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Length of this packet once framed
    pub fn frame_len(&self) -> usize {
        LINK_FRAME_OVERHEAD + self.payload_len
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("source", &(self.source as char))
            .field("destination", &(self.destination as char))
            .field("payload", &self.payload())
            .finish()
    }
}
