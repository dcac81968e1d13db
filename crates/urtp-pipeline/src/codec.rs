//! Block codecs for the URTP datagram body.
//!
//! Two families share the 14-byte header: plain PCM-16 and the
//! NICAM-style UNICAM block companding at 8 or 10 bits per sample.
//!
//! UNICAM partitions the 320-sample block into 20 sub-blocks of 16
//! samples. Each sub-block is scaled by an arithmetic right shift chosen
//! from its peak magnitude, and the 4-bit shift code needed to restore
//! 16-bit dynamic range rides along on the wire. Two consecutive
//! sub-blocks share one shift byte (low nibble = even block, high nibble
//! = odd block) placed between their sample runs; a trailing unpaired
//! sub-block carries its nibble in the low half of its own byte.
//!
//! The codecs rely on arithmetic (sign-preserving) right shift; callers
//! must check [`arithmetic_shift_is_sign_preserving`] before selecting a
//! UNICAM coding.

use urtp_icd::{Coding, SAMPLES_PER_BLOCK, SAMPLES_PER_UNICAM_BLOCK};

/// Whether `>>` on negative values keeps the sign on this target.
///
/// The UNICAM scaling is built on this property; refuse to run the
/// companded codings where it does not hold.
#[inline]
pub fn arithmetic_shift_is_sign_preserving() -> bool {
    (-2i32 >> 1) == -1
}

/// Shift pair for one UNICAM sub-block.
///
/// `shift32` scales the 32-bit sample down to `width` bits; the wire
/// carries `shift16 = max(0, shift32 - 16)`, which is what the receiver
/// needs to restore the sub-block to 16-bit dynamic range.
pub fn unicam_shift_codes(max_abs: u32, width: u32) -> (u32, u8) {
    let used_bits = 32 - max_abs.leading_zeros();
    let shift32 = used_bits.saturating_sub(width);
    let shift16 = shift32.saturating_sub(16) as u8;
    (shift32, shift16)
}

/// Encode one block of gain-adjusted samples into `out`.
///
/// Returns the body length, which is always `coding.body_size()`.
///
/// # Panics
///
/// Panics if `out` is shorter than the body for `coding`.
pub fn encode_block(
    coding: Coding,
    samples: &[i32; SAMPLES_PER_BLOCK],
    out: &mut [u8],
) -> usize {
    match coding {
        Coding::Pcm16 => encode_pcm16(samples, out),
        Coding::Unicam8 => encode_unicam(samples, 8, out),
        Coding::Unicam10 => encode_unicam(samples, 10, out),
    }
}

fn encode_pcm16(samples: &[i32; SAMPLES_PER_BLOCK], out: &mut [u8]) -> usize {
    for (sample, bytes) in samples.iter().zip(out.chunks_exact_mut(2)) {
        bytes[0] = (sample >> 24) as u8;
        bytes[1] = (sample >> 16) as u8;
    }
    2 * SAMPLES_PER_BLOCK
}

fn encode_unicam(
    samples: &[i32; SAMPLES_PER_BLOCK],
    width: u32,
    out: &mut [u8],
) -> usize {
    let mut writer = BitWriter::new(out);

    let mut chunks = samples.chunks_exact(SAMPLES_PER_UNICAM_BLOCK);
    loop {
        let Some(even) = chunks.next() else { break };
        let (even_shift32, even_shift16) = sub_block_shifts(even, width);

        match chunks.next() {
            Some(odd) => {
                let (odd_shift32, odd_shift16) =
                    sub_block_shifts(odd, width);
                write_sub_block(&mut writer, even, even_shift32, width);
                writer.write_byte(even_shift16 | (odd_shift16 << 4));
                write_sub_block(&mut writer, odd, odd_shift32, width);
            }
            None => {
                write_sub_block(&mut writer, even, even_shift32, width);
                writer.write_byte(even_shift16);
            }
        }
    }

    writer.finish()
}

fn sub_block_shifts(sub_block: &[i32], width: u32) -> (u32, u8) {
    let max_abs =
        sub_block.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    unicam_shift_codes(max_abs, width)
}

fn write_sub_block(
    writer: &mut BitWriter<'_>,
    sub_block: &[i32],
    shift32: u32,
    width: u32,
) {
    for &sample in sub_block {
        writer.write_bits((sample >> shift32) as u32, width);
    }
}

/// Decode a URTP body back into 16-bit-range samples.
///
/// This is the reference decoder the tests (and any diagnostic host)
/// validate against; the streaming receiver proper lives elsewhere.
/// PCM-16 recovers the encoded 16 bits exactly. UNICAM recovers each
/// sample's most significant `width` bits positioned in the 16-bit
/// range, exact whenever the sub-block's scaled peak fits `width`-bit
/// two's complement.
///
/// Returns the number of samples written.
///
/// # Panics
///
/// Panics if `body` is shorter than `coding.body_size()`.
pub fn decode_block(
    coding: Coding,
    body: &[u8],
    out: &mut [i32; SAMPLES_PER_BLOCK],
) -> usize {
    match coding {
        Coding::Pcm16 => {
            for (bytes, sample) in
                body.chunks_exact(2).take(SAMPLES_PER_BLOCK).zip(out.iter_mut())
            {
                *sample = i16::from_be_bytes([bytes[0], bytes[1]]) as i32;
            }
            SAMPLES_PER_BLOCK
        }
        Coding::Unicam8 => decode_unicam(body, 8, out),
        Coding::Unicam10 => decode_unicam(body, 10, out),
    }
}

fn decode_unicam(
    body: &[u8],
    width: u32,
    out: &mut [i32; SAMPLES_PER_BLOCK],
) -> usize {
    let mut reader = BitReader::new(body);
    let mut written = 0;

    while written < SAMPLES_PER_BLOCK {
        let remaining = SAMPLES_PER_BLOCK - written;
        if remaining >= 2 * SAMPLES_PER_UNICAM_BLOCK {
            let even_raw = read_raw_sub_block(&mut reader, width);
            let shifts = reader.read_byte();
            let odd_raw = read_raw_sub_block(&mut reader, width);
            expand_sub_block(
                &even_raw,
                shifts & 0x0F,
                width,
                &mut out[written..],
            );
            expand_sub_block(
                &odd_raw,
                shifts >> 4,
                width,
                &mut out[written + SAMPLES_PER_UNICAM_BLOCK..],
            );
            written += 2 * SAMPLES_PER_UNICAM_BLOCK;
        } else {
            let raw = read_raw_sub_block(&mut reader, width);
            let shifts = reader.read_byte();
            expand_sub_block(&raw, shifts & 0x0F, width, &mut out[written..]);
            written += SAMPLES_PER_UNICAM_BLOCK;
        }
    }

    written
}

fn read_raw_sub_block(
    reader: &mut BitReader<'_>,
    width: u32,
) -> [u32; SAMPLES_PER_UNICAM_BLOCK] {
    let mut raw = [0u32; SAMPLES_PER_UNICAM_BLOCK];
    for slot in &mut raw {
        *slot = reader.read_bits(width);
    }
    raw
}

fn expand_sub_block(
    raw: &[u32; SAMPLES_PER_UNICAM_BLOCK],
    shift16: u8,
    width: u32,
    out: &mut [i32],
) {
    for (&value, sample) in raw.iter().zip(out.iter_mut()) {
        *sample = sign_extend(value, width) << shift16;
    }
}

#[inline]
fn sign_extend(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

#[inline]
fn low_mask(bits: u32) -> u8 {
    ((1u16 << bits) - 1) as u8
}

/// MSB-first bit packer.
///
/// For the 10-bit samples the running bit offset cycles through
/// {0, 2, 4, 6}; a field never spans more than two bytes.
struct BitWriter<'a> {
    buf: &'a mut [u8],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    fn write_bits(&mut self, value: u32, count: u32) {
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.bit_pos / 8;
            let offset = (self.bit_pos % 8) as u32;
            let space = 8 - offset;
            let take = remaining.min(space);

            let chunk = ((value >> (remaining - take)) as u8) & low_mask(take);
            // Clear then set; earlier writes to this byte survive the
            // read-modify-write.
            let mask = low_mask(take) << (space - take);
            self.buf[byte] =
                (self.buf[byte] & !mask) | (chunk << (space - take));

            self.bit_pos += take as usize;
            remaining -= take;
        }
    }

    /// Write one whole byte; the writer must be byte-aligned.
    fn write_byte(&mut self, value: u8) {
        debug_assert_eq!(self.bit_pos % 8, 0);
        self.buf[self.bit_pos / 8] = value;
        self.bit_pos += 8;
    }

    /// Bytes consumed, rounding a partial trailing byte up.
    fn finish(self) -> usize {
        self.bit_pos.div_ceil(8)
    }
}

/// MSB-first bit reader matching [`BitWriter`].
struct BitReader<'a> {
    buf: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    fn read_bits(&mut self, count: u32) -> u32 {
        let mut value = 0u32;
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.bit_pos / 8;
            let offset = (self.bit_pos % 8) as u32;
            let space = 8 - offset;
            let take = remaining.min(space);

            let chunk = (self.buf[byte] >> (space - take)) & low_mask(take);
            value = (value << take) | chunk as u32;

            self.bit_pos += take as usize;
            remaining -= take;
        }
        value
    }

    fn read_byte(&mut self) -> u8 {
        debug_assert_eq!(self.bit_pos % 8, 0);
        let byte = self.buf[self.bit_pos / 8];
        self.bit_pos += 8;
        byte
    }
}
