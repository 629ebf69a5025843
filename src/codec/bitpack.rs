//! Block bit-packing for u32 streams.
//!
//! Values are packed in independent 128-value blocks. Each block stores a
//! one-byte bit width (the bits needed by the block's maximum value)
//! followed by `width * 16` payload bytes with values laid out LSB-first.
//! A zero width means an all-zero block with no payload. The tail of
//! fewer than 128 values is varint-coded. Random access into blocks is
//! not supported; streams are always decoded front to back.

use crate::codec::vbyte::{append_vbyte_u32, ByteReader};
use crate::error::{DataFeedError, Result};

/// Values per packed block.
pub const BLOCK_SIZE: usize = 128;

/// Bits needed to represent `value`.
#[inline]
pub fn bits_for(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// Bits needed by the largest value of a slice.
pub fn max_bits(values: &[u32]) -> u32 {
    // Fold the maximum first; one scan, branch-free in the hot loop.
    let max = values.iter().copied().fold(0u32, u32::max);
    bits_for(max)
}

/// Appends a packed representation of `values`.
pub fn append_bitpack(out: &mut Vec<u8>, values: &[u32]) {
    let mut rest = values;
    while rest.len() >= BLOCK_SIZE {
        let (block, tail) = rest.split_at(BLOCK_SIZE);
        pack_block(out, block);
        rest = tail;
    }
    for &v in rest {
        append_vbyte_u32(out, v);
    }
}

/// Reads `count` packed values into `out` (cleared first).
pub fn read_bitpack(reader: &mut ByteReader<'_>, count: usize, out: &mut Vec<u32>) -> Result<()> {
    out.clear();
    out.reserve(count);
    let mut remaining = count;
    while remaining >= BLOCK_SIZE {
        unpack_block(reader, out)?;
        remaining -= BLOCK_SIZE;
    }
    for _ in 0..remaining {
        out.push(reader.read_vbyte_u32()?);
    }
    Ok(())
}

fn pack_block(out: &mut Vec<u8>, block: &[u32]) {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    let width = max_bits(block);
    out.push(width as u8);
    if width == 0 {
        return;
    }

    let mut acc: u64 = 0;
    let mut nbits: u32 = 0;
    for &v in block {
        acc |= u64::from(v) << nbits;
        nbits += width;
        while nbits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            nbits -= 8;
        }
    }
    // 128 * width is always a whole number of bytes.
    debug_assert_eq!(nbits, 0);
}

fn unpack_block(reader: &mut ByteReader<'_>, out: &mut Vec<u32>) -> Result<()> {
    let width = u32::from(reader.read_u8()?);
    if width > 32 {
        return Err(DataFeedError::Overflow(format!(
            "bit width {} exceeds 32",
            width
        )));
    }
    if width == 0 {
        out.extend(std::iter::repeat(0).take(BLOCK_SIZE));
        return Ok(());
    }

    let payload = reader.read_bytes((width as usize) * BLOCK_SIZE / 8)?;
    let mask: u64 = if width == 32 {
        u64::from(u32::MAX)
    } else {
        (1u64 << width) - 1
    };

    let mut acc: u64 = 0;
    let mut nbits: u32 = 0;
    let mut byte_pos = 0usize;
    for _ in 0..BLOCK_SIZE {
        while nbits < width {
            acc |= u64::from(payload[byte_pos]) << nbits;
            byte_pos += 1;
            nbits += 8;
        }
        out.push((acc & mask) as u32);
        acc >>= width;
        nbits -= width;
    }
    Ok(())
}
