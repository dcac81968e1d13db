//! The URTP datagram wire format.
//!
//! All multi-byte fields are big-endian. The header is exactly
//! [`URTP_HEADER_SIZE`] bytes:
//!
//! | Offset | Size | Field       |
//! |--------|------|-------------|
//! | 0      | 1    | Sync (0x5A) |
//! | 1      | 1    | Coding      |
//! | 2      | 2    | Sequence    |
//! | 4      | 8    | Timestamp µs|
//! | 12     | 2    | Body length |

use crate::{SAMPLES_PER_BLOCK, UNICAM_BLOCKS_PER_DATAGRAM};

/// First byte of every URTP datagram.
pub const URTP_SYNC_BYTE: u8 = 0x5A;

/// Size of the URTP datagram header in bytes.
pub const URTP_HEADER_SIZE: usize = 14;

/// Byte offset of the sequence number within a datagram.
pub const URTP_SEQ_OFFSET: usize = 2;

/// Byte offset of the microsecond timestamp within a datagram.
pub const URTP_TIMESTAMP_OFFSET: usize = 4;

/// Byte offset of the body-length field within a datagram.
pub const URTP_BODY_LENGTH_OFFSET: usize = 12;

/// The largest datagram any coding produces (PCM-16).
pub const URTP_MAX_DATAGRAM_SIZE: usize =
    URTP_HEADER_SIZE + 2 * SAMPLES_PER_BLOCK;

/// Audio coding carried in a URTP datagram body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Coding {
    /// 16-bit big-endian PCM at 16 kHz.
    Pcm16,
    /// UNICAM block companding, 8 bits per sample, at 16 kHz.
    Unicam8,
    /// UNICAM block companding, 10 bits per sample, at 16 kHz.
    Unicam10,
}

impl Coding {
    /// The coding byte at offset 1 of the header.
    pub fn wire_byte(self) -> u8 {
        match self {
            Coding::Pcm16 => 0,
            Coding::Unicam8 => 1,
            Coding::Unicam10 => 2,
        }
    }

    /// Body size in bytes for one block of audio.
    pub fn body_size(self) -> usize {
        match self {
            Coding::Pcm16 => 2 * SAMPLES_PER_BLOCK,
            // 16 samples x 8 bits per sub-block plus one shared shift byte
            // per sub-block pair.
            Coding::Unicam8 => {
                SAMPLES_PER_BLOCK + UNICAM_BLOCKS_PER_DATAGRAM.div_ceil(2)
            }
            Coding::Unicam10 => {
                (SAMPLES_PER_BLOCK * 10) / 8
                    + UNICAM_BLOCKS_PER_DATAGRAM.div_ceil(2)
            }
        }
    }

    /// Total datagram size (header plus body) for this coding.
    pub fn datagram_size(self) -> usize {
        URTP_HEADER_SIZE + self.body_size()
    }

    /// Compressed sample width in bits, for the companded codings.
    pub fn sample_width_bits(self) -> Option<u32> {
        match self {
            Coding::Pcm16 => None,
            Coding::Unicam8 => Some(8),
            Coding::Unicam10 => Some(10),
        }
    }
}

impl TryFrom<u8> for Coding {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Coding::Pcm16),
            1 => Ok(Coding::Unicam8),
            2 => Ok(Coding::Unicam10),
            other => Err(HeaderError::BadCoding(other)),
        }
    }
}

/// Errors from parsing a URTP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderError {
    /// Fewer than [`URTP_HEADER_SIZE`] bytes available.
    Truncated,
    /// Sync byte was not [`URTP_SYNC_BYTE`].
    BadSync(u8),
    /// Unknown coding byte.
    BadCoding(u8),
}

/// The decoded fields of a URTP datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DatagramHeader {
    pub coding: Coding,
    pub sequence: u16,
    pub timestamp_us: u64,
    pub body_length: u16,
}

impl DatagramHeader {
    /// Serialize the header into the first [`URTP_HEADER_SIZE`] bytes of
    /// `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than the header.
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0] = URTP_SYNC_BYTE;
        buf[1] = self.coding.wire_byte();
        buf[URTP_SEQ_OFFSET..URTP_SEQ_OFFSET + 2]
            .copy_from_slice(&self.sequence.to_be_bytes());
        buf[URTP_TIMESTAMP_OFFSET..URTP_TIMESTAMP_OFFSET + 8]
            .copy_from_slice(&self.timestamp_us.to_be_bytes());
        buf[URTP_BODY_LENGTH_OFFSET..URTP_BODY_LENGTH_OFFSET + 2]
            .copy_from_slice(&self.body_length.to_be_bytes());
    }

    /// Parse a header from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < URTP_HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }
        if buf[0] != URTP_SYNC_BYTE {
            return Err(HeaderError::BadSync(buf[0]));
        }
        let coding = Coding::try_from(buf[1])?;
        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp_us = u64::from_be_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);
        let body_length = u16::from_be_bytes([buf[12], buf[13]]);
        Ok(Self { coding, sequence, timestamp_us, body_length })
    }
}

/// Read the sequence number straight out of an encoded datagram.
///
/// The sender uses this for its skip diagnostics without a full parse.
pub fn peek_sequence(datagram: &[u8]) -> Option<u16> {
    let bytes = datagram.get(URTP_SEQ_OFFSET..URTP_SEQ_OFFSET + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
