//! # Link Frame Encoder
//!
//! Serializes a [`Packet`] into a wire frame. The controller itself only
//! receives frames; the encoder is what the host side (and the tests) use
//! to talk to it.

use super::crc::crc8_dvb_s2;
use super::protocol::*;

/// Encode a packet into a complete frame
///
/// # Returns
///
/// * `Vec<u8>` - sync + source + destination + len + payload + crc
///
/// # Examples
///
/// ```
/// use flap_bridge::link::encoder::encode_frame;
/// use flap_bridge::link::protocol::{Packet, LINK_SYNC_BYTE};
///
/// let packet = Packet::new(b'N', b'F', b"O\0\0\0\0")?;
/// let frame = encode_frame(&packet);
/// assert_eq!(frame.len(), 10);
/// assert_eq!(frame[0], LINK_SYNC_BYTE);
/// # Ok::<(), flap_bridge::error::FlapError>(())
/// ```
pub fn encode_frame(packet: &Packet) -> Vec<u8> {
    let mut frame = Vec::with_capacity(packet.frame_len());
    frame.push(LINK_SYNC_BYTE);
    frame.push(packet.source);
    frame.push(packet.destination);
    // Packet::new bounds the payload to 30 bytes
    frame.push(packet.payload_len() as u8);
    frame.extend_from_slice(packet.payload());

    let crc = crc8_dvb_s2(&frame[1..]);
    frame.push(crc);

    frame
}
