//! Column decoders for the columnar tick format.
//!
//! Inverse of `tick_encoder`: every read is bounds-checked, and decoded
//! counts are validated against the declared tick count before any
//! expansion happens.

use crate::codec::bitpack::read_bitpack;
use crate::codec::context::CodecContext;
use crate::codec::delta::{
    decode_delta_sorted_u32, decode_delta_sorted_u64, decode_delta_zigzag_u32,
};
use crate::codec::frequency::{decode_frequency_u32, decode_frequency_u64};
use crate::codec::repeats::{decode_with_repeats, decode_zero_runs};
use crate::codec::tick_encoder::{TIME_REPEAT_BITS, VOLUME_REPEAT_BITS};
use crate::codec::vbyte::ByteReader;
use crate::codec::zigzag::{zigzag_decode_u32, zigzag_decode_u64};
use crate::data::ticks::{MarketTick, TickUpdateFlags};
use crate::error::{DataFeedError, Result};

fn check_dict_len(dict_len: usize, num_ticks: usize) -> Result<()> {
    if dict_len > num_ticks {
        return Err(DataFeedError::Overflow(format!(
            "dictionary of {} entries for {} ticks",
            dict_len, num_ticks
        )));
    }
    Ok(())
}

fn check_token_len(token_len: usize, num_ticks: usize) -> Result<()> {
    if token_len > num_ticks {
        return Err(DataFeedError::Overflow(format!(
            "{} run-length tokens for {} ticks",
            token_len, num_ticks
        )));
    }
    Ok(())
}

/// Decodes the last-price column into `ticks`, reconstructing
/// `LAST_UPDATED` flags from non-zero deltas when `set_flags` is on.
pub(crate) fn decode_price_column(
    ctx: &mut CodecContext,
    reader: &mut ByteReader<'_>,
    ticks: &mut [MarketTick],
    price_scale: f64,
    initial_price: i64,
    set_flags: bool,
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

    let num_ticks = ticks.len();
    let word = reader.read_vbyte_u32()?;
    let is_u64 = word & 1 != 0;
    let dict_len = (word >> 1) as usize;
    check_dict_len(dict_len, num_ticks)?;

    if !is_u64 {
        read_bitpack(reader, dict_len, values_u32)?;
        decode_delta_sorted_u32(values_u32)?;
    } else {
        reader.read_vbyte_u64_slice(dict_len, values_u64)?;
        decode_delta_sorted_u64(values_u64)?;
    }
    read_bitpack(reader, dict_len, index_map_u32)?;
    decode_delta_zigzag_u32(index_map_u32)?;

    let token_len = reader.read_vbyte_u32()? as usize;
    check_token_len(token_len, num_ticks)?;
    read_bitpack(reader, token_len, repeats_u32)?;
    decode_zero_runs(repeats_u32, num_ticks, codes_u32)?;

    let mut prev = initial_price;
    if !is_u64 {
        decode_frequency_u32(codes_u32, values_u32, index_map_u32, deltas_u32)?;
        for (i, tick) in ticks.iter_mut().enumerate() {
            let delta = i64::from(zigzag_decode_u32(deltas_u32[i]));
            prev = prev.wrapping_add(delta);
            tick.last = prev as f64 / price_scale;
            if set_flags && i > 0 && delta != 0 {
                tick.set_flag(TickUpdateFlags::LastUpdated);
            }
        }
    } else {
        decode_frequency_u64(codes_u32, values_u64, index_map_u32, deltas_u64)?;
        for (i, tick) in ticks.iter_mut().enumerate() {
            let delta = zigzag_decode_u64(deltas_u64[i]);
            prev = prev.wrapping_add(delta);
            tick.last = prev as f64 / price_scale;
            if set_flags && i > 0 && delta != 0 {
                tick.set_flag(TickUpdateFlags::LastUpdated);
            }
        }
    }
    Ok(())
}

/// Decodes the volume column.
pub(crate) fn decode_volume_column(
    ctx: &mut CodecContext,
    reader: &mut ByteReader<'_>,
    ticks: &mut [MarketTick],
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

    let num_ticks = ticks.len();
    let word = reader.read_vbyte_u32()?;
    let is_u64 = word & 1 != 0;
    let dict_len = (word >> 1) as usize;
    check_dict_len(dict_len, num_ticks)?;

    if !is_u64 {
        read_bitpack(reader, dict_len, values_u32)?;
        decode_delta_sorted_u32(values_u32)?;
    } else {
        reader.read_vbyte_u64_slice(dict_len, values_u64)?;
        decode_delta_sorted_u64(values_u64)?;
    }
    read_bitpack(reader, dict_len, index_map_u32)?;
    decode_delta_zigzag_u32(index_map_u32)?;

    let token_len = reader.read_vbyte_u32()? as usize;
    check_token_len(token_len, num_ticks)?;
    read_bitpack(reader, token_len, repeats_u32)?;
    decode_with_repeats(repeats_u32, VOLUME_REPEAT_BITS, num_ticks, codes_u32)?;

    if !is_u64 {
        decode_frequency_u32(codes_u32, values_u32, index_map_u32, deltas_u32)?;
        for (tick, &scaled) in ticks.iter_mut().zip(deltas_u32.iter()) {
            tick.volume = f64::from(scaled) / volume_scale;
        }
    } else {
        decode_frequency_u64(codes_u32, values_u64, index_map_u32, deltas_u64)?;
        for (tick, &scaled) in ticks.iter_mut().zip(deltas_u64.iter()) {
            tick.volume = scaled as f64 / volume_scale;
        }
    }
    Ok(())
}

/// Decodes the time column.
pub(crate) fn decode_time_column(
    ctx: &mut CodecContext,
    reader: &mut ByteReader<'_>,
    ticks: &mut [MarketTick],
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

    let num_ticks = ticks.len();
    let dict_len = reader.read_vbyte_u32()? as usize;
    check_dict_len(dict_len, num_ticks)?;

    read_bitpack(reader, dict_len, values_u32)?;
    decode_delta_sorted_u32(values_u32)?;
    read_bitpack(reader, dict_len, index_map_u32)?;
    decode_delta_zigzag_u32(index_map_u32)?;

    let token_len = reader.read_vbyte_u32()? as usize;
    check_token_len(token_len, num_ticks)?;
    read_bitpack(reader, token_len, repeats_u32)?;
    decode_with_repeats(repeats_u32, TIME_REPEAT_BITS, num_ticks, codes_u32)?;

    decode_frequency_u32(codes_u32, values_u32, index_map_u32, deltas_u32)?;
    let mut time = base_time_ms;
    for (tick, &delta) in ticks.iter_mut().zip(deltas_u32.iter()) {
        time += u64::from(delta);
        tick.time_ms = time;
    }
    Ok(())
}

/// Unpacks MSB-first side bits: set bits are buys, clear bits sells.
pub(crate) fn decode_side_flags(reader: &mut ByteReader<'_>, ticks: &mut [MarketTick]) -> Result<()> {
    let num_bytes = (ticks.len() + 7) / 8;
    let bytes = reader.read_bytes(num_bytes)?;
    for (i, tick) in ticks.iter_mut().enumerate() {
        let bit = (bytes[i / 8] >> (7 - (i % 8))) & 1;
        if bit != 0 {
            tick.set_flag(TickUpdateFlags::TickFromBuy);
        } else {
            tick.set_flag(TickUpdateFlags::TickFromSell);
        }
    }
    Ok(())
}

/// Decodes the received-time column.
pub(crate) fn decode_recv_column(
    ctx: &mut CodecContext,
    reader: &mut ByteReader<'_>,
    ticks: &mut [MarketTick],
) -> Result<()> {
    let CodecContext {
        deltas_u32,
        deltas_u64,
        ..
    } = ctx;

    let is_u64 = reader.read_u8()? != 0;
    if !is_u64 {
        read_bitpack(reader, ticks.len(), deltas_u32)?;
        for (tick, &zz) in ticks.iter_mut().zip(deltas_u32.iter()) {
            let delta = i64::from(zigzag_decode_u32(zz));
            tick.received_ms = (tick.time_ms as i64 + delta) as u64;
        }
    } else {
        reader.read_vbyte_u64_slice(ticks.len(), deltas_u64)?;
        for (tick, &zz) in ticks.iter_mut().zip(deltas_u64.iter()) {
            let delta = zigzag_decode_u64(zz);
            tick.received_ms = (tick.time_ms as i64 + delta) as u64;
        }
    }
    Ok(())
}
