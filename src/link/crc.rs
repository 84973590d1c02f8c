//! # CRC8-DVB-S2 Implementation
//!
//! Frame checksum for the flap link. Covers source, destination,
//! length and payload bytes (everything between sync and CRC).
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00

const CRC8_POLY: u8 = 0xD5;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the frame checksum
///
/// # Arguments
///
/// * `data` - Header and payload bytes of a frame (without the sync byte)
///
/// # Examples
///
/// ```
/// use flap_bridge::link::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(&[]), 0x00);
/// assert_ne!(crc8_dvb_s2(b"ABO"), crc8_dvb_s2(b"ABC"));
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}
