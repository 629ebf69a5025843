//! Column encoders for the columnar tick format.
//!
//! Each column is encoded independently: scale → delta/zig-zag →
//! frequency substitution → run-length → dictionary packing. Every column
//! tries the u32 path first and re-encodes from scratch as u64 when a
//! delta or scaled value would overflow; the dictionary-length word's LSB
//! records the promotion for the decoder.

use crate::codec::bitpack::append_bitpack;
use crate::codec::context::CodecContext;
use crate::codec::delta::{
    delta_zigzag_u64, encode_delta_sorted_u32, encode_delta_sorted_u64, encode_delta_zigzag_u32,
    try_delta_zigzag_u32,
};
use crate::codec::frequency::{encode_frequency_u32, encode_frequency_u64};
use crate::codec::repeats::{encode_with_repeats, encode_zero_runs};
use crate::codec::vbyte::{append_vbyte_u32, append_vbyte_u64_slice};
use crate::codec::zigzag::zigzag_encode_i64;
use crate::data::ticks::{MarketTick, TickUpdateFlags};
use crate::error::{DataFeedError, Result};

/// Run-length value width for volume code streams. Small scaled volumes
/// repeat densely, so a few bits of inline value pay for themselves.
pub(crate) const VOLUME_REPEAT_BITS: u32 = 4;
/// Run-length value width for time-delta code streams.
pub(crate) const TIME_REPEAT_BITS: u32 = 4;

/// Encodes the last-price column.
pub(crate) fn encode_price_column(
    ctx: &mut CodecContext,
    out: &mut Vec<u8>,
    ticks: &[MarketTick],
    price_scale: f64,
    initial_price: i64,
) -> Result<()> {
    let CodecContext {
        scaled_i64,
        deltas_u32,
        deltas_u64,
        values_u32,
        values_u64,
        index_map_u32,
        codes_u32,
        repeats_u32,
    } = ctx;

    scaled_i64.clear();
    scaled_i64.reserve(ticks.len());
    for tick in ticks {
        scaled_i64.push((tick.last * price_scale).round() as i64);
    }

    if try_delta_zigzag_u32(scaled_i64, initial_price, deltas_u32) {
        encode_frequency_u32(deltas_u32, codes_u32, values_u32, index_map_u32);
        encode_zero_runs(codes_u32, repeats_u32);
        encode_delta_sorted_u32(values_u32);
        encode_delta_zigzag_u32(index_map_u32);

        append_vbyte_u32(out, (values_u32.len() as u32) << 1);
        append_bitpack(out, values_u32);
        append_bitpack(out, index_map_u32);
        append_vbyte_u32(out, repeats_u32.len() as u32);
        append_bitpack(out, repeats_u32);
    } else {
        delta_zigzag_u64(scaled_i64, initial_price, deltas_u64);
        encode_frequency_u64(deltas_u64, codes_u32, values_u64, index_map_u32);
        encode_zero_runs(codes_u32, repeats_u32);
        encode_delta_sorted_u64(values_u64);
        encode_delta_zigzag_u32(index_map_u32);

        append_vbyte_u32(out, ((values_u64.len() as u32) << 1) | 1);
        append_vbyte_u64_slice(out, values_u64);
        append_bitpack(out, index_map_u32);
        append_vbyte_u32(out, repeats_u32.len() as u32);
        append_bitpack(out, repeats_u32);
    }
    Ok(())
}

/// Encodes the volume column. Volumes are scaled absolute values, not
/// deltas: trade sizes cluster around a handful of lot sizes, which the
/// frequency stage exploits directly.
pub(crate) fn encode_volume_column(
    ctx: &mut CodecContext,
    out: &mut Vec<u8>,
    ticks: &[MarketTick],
    volume_scale: f64,
) -> Result<()> {
    let CodecContext {
        deltas_u32,
        deltas_u64,
        values_u32,
        values_u64,
        index_map_u32,
        codes_u32,
        repeats_u32,
        ..
    } = ctx;

    let mut fits_u32 = true;
    deltas_u64.clear();
    deltas_u64.reserve(ticks.len());
    for (i, tick) in ticks.iter().enumerate() {
        let scaled = (tick.volume * volume_scale).round();
        if scaled < 0.0 {
            return Err(DataFeedError::Overflow(format!(
                "negative volume at tick {}",
                i
            )));
        }
        let scaled = scaled as u64;
        fits_u32 &= scaled <= u64::from(u32::MAX);
        deltas_u64.push(scaled);
    }

    if fits_u32 {
        deltas_u32.clear();
        deltas_u32.extend(deltas_u64.iter().map(|&v| v as u32));
        encode_frequency_u32(deltas_u32, codes_u32, values_u32, index_map_u32);
        encode_with_repeats(codes_u32, VOLUME_REPEAT_BITS, repeats_u32);
        encode_delta_sorted_u32(values_u32);
        encode_delta_zigzag_u32(index_map_u32);

        append_vbyte_u32(out, (values_u32.len() as u32) << 1);
        append_bitpack(out, values_u32);
        append_bitpack(out, index_map_u32);
        append_vbyte_u32(out, repeats_u32.len() as u32);
        append_bitpack(out, repeats_u32);
    } else {
        encode_frequency_u64(deltas_u64, codes_u32, values_u64, index_map_u32);
        encode_with_repeats(codes_u32, VOLUME_REPEAT_BITS, repeats_u32);
        encode_delta_sorted_u64(values_u64);
        encode_delta_zigzag_u32(index_map_u32);

        append_vbyte_u32(out, ((values_u64.len() as u32) << 1) | 1);
        append_vbyte_u64_slice(out, values_u64);
        append_bitpack(out, index_map_u32);
        append_vbyte_u32(out, repeats_u32.len() as u32);
        append_bitpack(out, repeats_u32);
    }
    Ok(())
}

/// Encodes the time column as successive millisecond deltas from the
/// segment base. Deltas never overflow u32 inside a one-hour segment.
pub(crate) fn encode_time_column(
    ctx: &mut CodecContext,
    out: &mut Vec<u8>,
    ticks: &[MarketTick],
    base_time_ms: u64,
) -> Result<()> {
    let CodecContext {
        deltas_u32,
        values_u32,
        index_map_u32,
        codes_u32,
        repeats_u32,
        ..
    } = ctx;

    deltas_u32.clear();
    deltas_u32.reserve(ticks.len());
    let mut prev = base_time_ms;
    for (i, tick) in ticks.iter().enumerate() {
        if tick.time_ms < prev {
            return Err(DataFeedError::OutOfOrder(i));
        }
        let delta = tick.time_ms - prev;
        if delta > u64::from(u32::MAX) {
            return Err(DataFeedError::Overflow(format!(
                "time delta at tick {} exceeds u32",
                i
            )));
        }
        deltas_u32.push(delta as u32);
        prev = tick.time_ms;
    }

    encode_frequency_u32(deltas_u32, codes_u32, values_u32, index_map_u32);
    encode_with_repeats(codes_u32, TIME_REPEAT_BITS, repeats_u32);
    encode_delta_sorted_u32(values_u32);
    encode_delta_zigzag_u32(index_map_u32);

    append_vbyte_u32(out, values_u32.len() as u32);
    append_bitpack(out, values_u32);
    append_bitpack(out, index_map_u32);
    append_vbyte_u32(out, repeats_u32.len() as u32);
    append_bitpack(out, repeats_u32);
    Ok(())
}

/// Packs the buy/sell side bit of every tick, MSB-first.
pub(crate) fn encode_side_flags(out: &mut Vec<u8>, ticks: &[MarketTick]) {
    let mut byte = 0u8;
    let mut nbits = 0u32;
    for tick in ticks {
        let bit = tick.has_flag(TickUpdateFlags::TickFromBuy) as u8;
        byte = (byte << 1) | bit;
        nbits += 1;
        if nbits == 8 {
            out.push(byte);
            byte = 0;
            nbits = 0;
        }
    }
    if nbits > 0 {
        out.push(byte << (8 - nbits));
    }
}

/// Encodes the received-time column as zig-zag deltas from `time_ms`.
pub(crate) fn encode_recv_column(
    ctx: &mut CodecContext,
    out: &mut Vec<u8>,
    ticks: &[MarketTick],
) -> Result<()> {
    let CodecContext {
        deltas_u32,
        deltas_u64,
        ..
    } = ctx;

    deltas_u64.clear();
    deltas_u64.reserve(ticks.len());
    let mut fits_u32 = true;
    for tick in ticks {
        let zz = zigzag_encode_i64(tick.received_ms as i64 - tick.time_ms as i64);
        fits_u32 &= zz <= u64::from(u32::MAX);
        deltas_u64.push(zz);
    }

    if fits_u32 {
        out.push(0);
        deltas_u32.clear();
        deltas_u32.extend(deltas_u64.iter().map(|&v| v as u32));
        append_bitpack(out, deltas_u32);
    } else {
        out.push(1);
        append_vbyte_u64_slice(out, deltas_u64);
    }
    Ok(())
}
