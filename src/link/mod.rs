//! # Link Layer Module
//!
//! Framed packet link carried over the USB serial channel.
//!
//! This module handles:
//! - Frame layout constants and the bounded [`Packet`](protocol::Packet) type
//! - CRC8-DVB-S2 checksum calculation
//! - Frame encoding (used by host tooling and tests)
//! - Incremental frame reception with resynchronisation on bad data

pub mod protocol;
pub mod encoder;
pub mod receiver;
pub mod crc;
