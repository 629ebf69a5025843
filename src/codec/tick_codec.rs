//! Tick serializer entry points.
//!
//! Two wire formats share a one-byte signature space:
//!
//! - `0x00` is the raw binary fallback: fixed-size little-endian records,
//!   selected by `STORE_RAW_BINARY`.
//! - `0x01` is columnar V1: the delta / frequency / run-length / bit-pack
//!   pipeline, selected for trade-based streams.
//!
//! Decoding never partially populates the output: ticks are staged in a
//! scratch vector and appended only after the whole blob parses.

use crate::codec::context::CodecContext;
use crate::codec::tick_decoder::{
    decode_price_column, decode_recv_column, decode_side_flags, decode_time_column,
    decode_volume_column,
};
use crate::codec::tick_encoder::{
    encode_price_column, encode_recv_column, encode_side_flags, encode_time_column,
    encode_volume_column,
};
use crate::codec::vbyte::{append_vbyte_u32, append_vbyte_u64, ByteReader};
use crate::data::ticks::{MarketTick, TickCodecConfig, TickUpdateFlags};
use crate::error::{DataFeedError, Result};
use crate::utils::math::pow10_f64;
use crate::utils::time::MS_PER_HOUR;

/// Signature byte of the raw binary fallback.
pub const SIGNATURE_RAW_V0: u8 = 0x00;
/// Signature byte of the columnar V1 format.
pub const SIGNATURE_COLUMNAR_V1: u8 = 0x01;

/// Upper bound on the tick count a single blob may declare.
pub const MAX_TICK_COUNT: usize = 1 << 28;

const RAW_RECORD_SIZE: usize = 56;

/// Wire format selector, dispatched once per blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSerializer {
    /// Fixed-layout binary records.
    RawV0,
    /// Columnar compressed format.
    ColumnarV1,
}

impl TickSerializer {
    /// Chooses the serializer a config calls for.
    pub fn for_config(config: &TickCodecConfig) -> Result<Self> {
        if config.store_raw_binary {
            return Ok(TickSerializer::RawV0);
        }
        if config.trade_based {
            return Ok(TickSerializer::ColumnarV1);
        }
        Err(DataFeedError::InvalidConfig(
            "columnar encoding requires trade-based data; set STORE_RAW_BINARY otherwise".into(),
        ))
    }

    /// Resolves a serializer from a signature byte.
    pub fn from_signature(signature: u8) -> Result<Self> {
        match signature {
            SIGNATURE_RAW_V0 => Ok(TickSerializer::RawV0),
            SIGNATURE_COLUMNAR_V1 => Ok(TickSerializer::ColumnarV1),
            other => Err(DataFeedError::BadSignature(other)),
        }
    }
}

/// True when the buffer starts with a known tick format signature.
pub fn is_valid_signature(input: &[u8]) -> bool {
    matches!(
        input.first(),
        Some(&SIGNATURE_RAW_V0) | Some(&SIGNATURE_COLUMNAR_V1)
    )
}

/// Stateful tick codec owning the scratch context.
#[derive(Debug, Default)]
pub struct TickCodec {
    ctx: CodecContext,
}

impl TickCodec {
    /// Creates a codec with empty scratch buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `ticks` into `out` (cleared first) using the format the
    /// config selects.
    pub fn serialize(
        &mut self,
        ticks: &[MarketTick],
        config: &TickCodecConfig,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        config.validate()?;
        if ticks.len() > MAX_TICK_COUNT {
            return Err(DataFeedError::Overflow(format!(
                "tick count {} exceeds limit",
                ticks.len()
            )));
        }
        out.clear();
        match TickSerializer::for_config(config)? {
            TickSerializer::RawV0 => serialize_raw(ticks, config, out),
            TickSerializer::ColumnarV1 => self.serialize_columnar(ticks, config, out),
        }
    }

    /// Deserializes a blob, appending the decoded ticks to `ticks` and
    /// overwriting `config` with the stored configuration. On error the
    /// output vector is left exactly as passed in.
    pub fn deserialize(
        &mut self,
        input: &[u8],
        ticks: &mut Vec<MarketTick>,
        config: &mut TickCodecConfig,
    ) -> Result<()> {
        let mut reader = ByteReader::new(input);
        let signature = reader.read_u8()?;
        let (decoded, decoded_config) = match TickSerializer::from_signature(signature)? {
            TickSerializer::RawV0 => deserialize_raw(&mut reader)?,
            TickSerializer::ColumnarV1 => self.deserialize_columnar(&mut reader)?,
        };
        ticks.extend_from_slice(&decoded);
        *config = decoded_config;
        Ok(())
    }

    fn serialize_columnar(
        &mut self,
        ticks: &[MarketTick],
        config: &TickCodecConfig,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        out.push(SIGNATURE_COLUMNAR_V1);
        append_vbyte_u32(out, ticks.len() as u32);

        let first_last_updated = ticks
            .first()
            .map(|t| t.has_flag(TickUpdateFlags::LastUpdated))
            .unwrap_or(false);
        out.push(pack_header1(config));
        out.push(pack_header2(config, first_last_updated));

        let base_unix_hour = ticks.first().map(|t| t.time_ms / MS_PER_HOUR).unwrap_or(0);
        if base_unix_hour > u64::from(u32::MAX) {
            return Err(DataFeedError::Overflow("segment hour exceeds u32".into()));
        }
        let price_scale = pow10_f64(config.price_digits);
        let initial_price = ticks
            .first()
            .map(|t| (t.last * price_scale).round() as i64)
            .unwrap_or(0);
        if initial_price < 0 {
            return Err(DataFeedError::Overflow("negative initial price".into()));
        }

        append_vbyte_u32(out, base_unix_hour as u32);
        append_vbyte_u64(out, initial_price as u64);
        append_vbyte_u32(out, ticks.len() as u32);

        if ticks.is_empty() {
            return Ok(());
        }

        encode_price_column(&mut self.ctx, out, ticks, price_scale, initial_price)?;
        if config.enable_volume {
            encode_volume_column(&mut self.ctx, out, ticks, pow10_f64(config.volume_digits))?;
        }
        encode_time_column(&mut self.ctx, out, ticks, base_unix_hour * MS_PER_HOUR)?;
        if config.enable_tick_flags {
            encode_side_flags(out, ticks);
        }
        if config.enable_received_time {
            encode_recv_column(&mut self.ctx, out, ticks)?;
        }
        Ok(())
    }

    fn deserialize_columnar(
        &mut self,
        reader: &mut ByteReader<'_>,
    ) -> Result<(Vec<MarketTick>, TickCodecConfig)> {
        let num_ticks = reader.read_vbyte_u32()? as usize;
        if num_ticks > MAX_TICK_COUNT {
            return Err(DataFeedError::Overflow(format!(
                "tick count {} exceeds limit",
                num_ticks
            )));
        }

        let header1 = reader.read_u8()?;
        let header2 = reader.read_u8()?;
        let (config, first_last_updated) = unpack_headers(header1, header2, false);
        config.validate()?;

        let base_unix_hour = u64::from(reader.read_vbyte_u32()?);
        let initial_price = reader.read_vbyte_u64()? as i64;
        let echo = reader.read_vbyte_u32()? as usize;
        if echo != num_ticks {
            return Err(DataFeedError::Overflow(format!(
                "tick count echo {} disagrees with {}",
                echo, num_ticks
            )));
        }

        let mut ticks = vec![MarketTick::default(); num_ticks];
        if num_ticks == 0 {
            return Ok((ticks, config));
        }

        let price_scale = pow10_f64(config.price_digits);
        decode_price_column(
            &mut self.ctx,
            reader,
            &mut ticks,
            price_scale,
            initial_price,
            config.enable_tick_flags,
        )?;
        if config.enable_volume {
            decode_volume_column(
                &mut self.ctx,
                reader,
                &mut ticks,
                pow10_f64(config.volume_digits),
            )?;
        }
        decode_time_column(&mut self.ctx, reader, &mut ticks, base_unix_hour * MS_PER_HOUR)?;
        if config.enable_tick_flags {
            decode_side_flags(reader, &mut ticks)?;
            if first_last_updated {
                ticks[0].set_flag(TickUpdateFlags::LastUpdated);
            }
        }
        if config.enable_received_time {
            decode_recv_column(&mut self.ctx, reader, &mut ticks)?;
        }
        Ok((ticks, config))
    }
}

fn pack_header1(config: &TickCodecConfig) -> u8 {
    let mut header = config.price_digits & 0x1F;
    header |= (config.enable_tick_flags as u8) << 5;
    header |= (config.trade_based as u8) << 6;
    header
}

fn pack_header2(config: &TickCodecConfig, first_last_updated: bool) -> u8 {
    let mut header = config.volume_digits & 0x1F;
    header |= (config.enable_received_time as u8) << 5;
    header |= (config.enable_volume as u8) << 6;
    header |= (first_last_updated as u8) << 7;
    header
}

fn unpack_headers(header1: u8, header2: u8, store_raw: bool) -> (TickCodecConfig, bool) {
    let config = TickCodecConfig {
        price_digits: header1 & 0x1F,
        volume_digits: header2 & 0x1F,
        enable_tick_flags: header1 & 0x20 != 0,
        trade_based: header1 & 0x40 != 0,
        enable_received_time: header2 & 0x20 != 0,
        enable_volume: header2 & 0x40 != 0,
        store_raw_binary: store_raw,
    };
    (config, header2 & 0x80 != 0)
}

fn serialize_raw(ticks: &[MarketTick], config: &TickCodecConfig, out: &mut Vec<u8>) -> Result<()> {
    out.push(SIGNATURE_RAW_V0);
    append_vbyte_u32(out, ticks.len() as u32);
    out.push(pack_header1(config));
    out.push(pack_header2(config, false));
    out.reserve(ticks.len() * RAW_RECORD_SIZE);
    for tick in ticks {
        out.extend_from_slice(&tick.ask.to_le_bytes());
        out.extend_from_slice(&tick.bid.to_le_bytes());
        out.extend_from_slice(&tick.last.to_le_bytes());
        out.extend_from_slice(&tick.volume.to_le_bytes());
        out.extend_from_slice(&tick.time_ms.to_le_bytes());
        out.extend_from_slice(&tick.received_ms.to_le_bytes());
        out.extend_from_slice(&tick.flags.to_le_bytes());
    }
    Ok(())
}

fn deserialize_raw(reader: &mut ByteReader<'_>) -> Result<(Vec<MarketTick>, TickCodecConfig)> {
    let num_ticks = reader.read_vbyte_u32()? as usize;
    if num_ticks > MAX_TICK_COUNT {
        return Err(DataFeedError::Overflow(format!(
            "tick count {} exceeds limit",
            num_ticks
        )));
    }
    let header1 = reader.read_u8()?;
    let header2 = reader.read_u8()?;
    let (config, _) = unpack_headers(header1, header2, true);
    config.validate()?;

    let mut ticks = Vec::with_capacity(num_ticks);
    for _ in 0..num_ticks {
        let record = reader.read_bytes(RAW_RECORD_SIZE)?;
        let f64_at = |o: usize| f64::from_le_bytes(record[o..o + 8].try_into().unwrap());
        let u64_at = |o: usize| u64::from_le_bytes(record[o..o + 8].try_into().unwrap());
        ticks.push(MarketTick {
            ask: f64_at(0),
            bid: f64_at(8),
            last: f64_at(16),
            volume: f64_at(24),
            time_ms: u64_at(32),
            received_ms: u64_at(40),
            flags: u64_at(48),
        });
    }
    Ok((ticks, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade_config() -> TickCodecConfig {
        TickCodecConfig {
            price_digits: 2,
            volume_digits: 3,
            trade_based: true,
            enable_tick_flags: true,
            enable_received_time: false,
            enable_volume: true,
            store_raw_binary: false,
        }
    }

    fn make_trade_ticks(count: usize, base_ms: u64) -> Vec<MarketTick> {
        let prices = [10000.00, 10000.01, 10000.02, 10000.03];
        (0..count)
            .map(|i| {
                let mut tick =
                    MarketTick::trade(prices[i % 4], 0.5, base_ms + (i as u64) * 3600, 0);
                if i % 2 == 0 {
                    tick.set_flag(TickUpdateFlags::TickFromBuy);
                } else {
                    tick.set_flag(TickUpdateFlags::TickFromSell);
                }
                if i > 0 {
                    tick.set_flag(TickUpdateFlags::LastUpdated);
                }
                tick
            })
            .collect()
    }

    #[test]
    fn test_columnar_roundtrip_single_hour() {
        let base_ms = 1_704_067_200_000u64; // 2024-01-01T00:00:00Z
        let ticks = make_trade_ticks(1000, base_ms);
        let config = trade_config();

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();
        assert_eq!(blob[0], SIGNATURE_COLUMNAR_V1);
        assert!(blob.len() < 8 * 1024, "blob was {} bytes", blob.len());

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();

        assert_eq!(decoded.len(), ticks.len());
        assert_eq!(decoded_config, config);
        for (orig, dec) in ticks.iter().zip(decoded.iter()) {
            assert_eq!(orig.time_ms, dec.time_ms);
            assert!((orig.last - dec.last).abs() < 0.005);
            assert!((orig.volume - dec.volume).abs() < 0.0005);
            assert_eq!(
                orig.has_flag(TickUpdateFlags::TickFromBuy),
                dec.has_flag(TickUpdateFlags::TickFromBuy)
            );
            assert_eq!(
                orig.has_flag(TickUpdateFlags::LastUpdated),
                dec.has_flag(TickUpdateFlags::LastUpdated)
            );
        }
    }

    #[test]
    fn test_columnar_with_received_time() {
        let base_ms = 1_704_067_200_000u64;
        let mut ticks = make_trade_ticks(500, base_ms);
        for (i, tick) in ticks.iter_mut().enumerate() {
            tick.received_ms = tick.time_ms + (i as u64 % 7);
        }
        let mut config = trade_config();
        config.enable_received_time = true;

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();
        for (orig, dec) in ticks.iter().zip(decoded.iter()) {
            assert_eq!(orig.received_ms, dec.received_ms);
        }
    }

    #[test]
    fn test_columnar_wide_price_promotes_to_u64() {
        let base_ms = 1_704_067_200_000u64;
        let mut ticks = make_trade_ticks(10, base_ms);
        // Second tick jumps far enough that the scaled delta leaves i32.
        ticks[1].last = 10000.0 + 400_000_000.0;
        let config = trade_config();

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();
        for (orig, dec) in ticks.iter().zip(decoded.iter()) {
            assert!((orig.last - dec.last).abs() < 0.005);
        }
    }

    #[test]
    fn test_raw_roundtrip_preserves_everything() {
        let base_ms = 1_704_067_200_000u64;
        let mut ticks = make_trade_ticks(64, base_ms);
        for tick in ticks.iter_mut() {
            tick.bid = tick.last - 0.01;
            tick.ask = tick.last + 0.01;
        }
        let mut config = trade_config();
        config.store_raw_binary = true;

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();
        assert_eq!(blob[0], SIGNATURE_RAW_V0);

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();
        assert_eq!(ticks, decoded);
        assert!(decoded_config.store_raw_binary);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let mut codec = TickCodec::new();
        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        let err = codec.deserialize(&[0x7F, 1, 2], &mut out, &mut config);
        assert!(matches!(err, Err(DataFeedError::BadSignature(0x7F))));
        assert!(out.is_empty());
        assert!(!is_valid_signature(&[0x7F]));
        assert!(is_valid_signature(&[0x01]));
    }

    #[test]
    fn test_excess_precision_rejected() {
        let mut config = trade_config();
        config.price_digits = 19;
        let mut codec = TickCodec::new();
        let mut out = Vec::new();
        assert!(matches!(
            codec.serialize(&[], &config, &mut out),
            Err(DataFeedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_trade_non_raw_rejected() {
        let mut config = trade_config();
        config.trade_based = false;
        let mut codec = TickCodec::new();
        let mut out = Vec::new();
        assert!(matches!(
            codec.serialize(&[], &config, &mut out),
            Err(DataFeedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let base_ms = 1_704_067_200_000u64;
        let ticks = make_trade_ticks(100, base_ms);
        let config = trade_config();

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();
        blob.truncate(blob.len() / 2);

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        let result = codec.deserialize(&blob, &mut decoded, &mut decoded_config);
        assert!(result.is_err());
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_random_stream_roundtrip() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);

        let lots = [0.1f64, 0.5, 1.0, 2.5];
        let mut time_ms = 1_704_067_200_000u64;
        let mut scaled_price: i64 = 2_500_000; // 25000.00 at 2 digits
        let ticks: Vec<MarketTick> = (0..5000)
            .map(|i| {
                time_ms += rng.gen_range(0..2500u64);
                let delta: i64 = rng.gen_range(-500..=500);
                scaled_price += delta;
                let mut tick = MarketTick::trade(
                    scaled_price as f64 / 100.0,
                    lots[rng.gen_range(0..lots.len())],
                    time_ms,
                    0,
                );
                tick.set_flag(if rng.gen_bool(0.5) {
                    TickUpdateFlags::TickFromBuy
                } else {
                    TickUpdateFlags::TickFromSell
                });
                if i > 0 && delta != 0 {
                    tick.set_flag(TickUpdateFlags::LastUpdated);
                }
                tick
            })
            .collect();

        let config = TickCodecConfig {
            price_digits: 2,
            volume_digits: 1,
            trade_based: true,
            enable_tick_flags: true,
            enable_volume: true,
            ..Default::default()
        };

        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&ticks, &config, &mut blob).unwrap();

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();

        assert_eq!(decoded.len(), ticks.len());
        for (orig, dec) in ticks.iter().zip(decoded.iter()) {
            assert_eq!(orig.time_ms, dec.time_ms);
            assert!((orig.last - dec.last).abs() < 0.005);
            assert!((orig.volume - dec.volume).abs() < 0.05);
            assert_eq!(orig.flags, dec.flags);
        }
    }

    #[test]
    fn test_empty_batch_roundtrip() {
        let config = trade_config();
        let mut codec = TickCodec::new();
        let mut blob = Vec::new();
        codec.serialize(&[], &config, &mut blob).unwrap();

        let mut decoded = Vec::new();
        let mut decoded_config = TickCodecConfig::default();
        codec
            .deserialize(&blob, &mut decoded, &mut decoded_config)
            .unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded_config, config);
    }
}
