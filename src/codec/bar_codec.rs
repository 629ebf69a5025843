//! Bar serializer.
//!
//! Signature `0x00` is the raw binary layout: a typed header followed by
//! fixed-size little-endian bar records. Signatures `0x01` and above are
//! reserved for compressed bar variants and currently rejected.

use crate::codec::vbyte::{append_vbyte_u32, append_vbyte_u64, ByteReader};
use crate::codec::zigzag::{zigzag_decode_u64, zigzag_encode_i64};
use crate::data::bars::{BarCodecConfig, BarStorageFlags, MarketBar, TimeFrame};
use crate::error::{DataFeedError, Result};

/// Signature byte of the raw binary bar layout.
pub const SIGNATURE_BAR_RAW_V1: u8 = 0x00;

/// Upper bound on the bar count a single blob may declare.
pub const MAX_BAR_COUNT: usize = 1 << 24;

const BAR_RECORD_SIZE: usize = 80;

/// True when the buffer starts with a known bar format signature.
pub fn is_valid_bar_signature(input: &[u8]) -> bool {
    matches!(input.first(), Some(&SIGNATURE_BAR_RAW_V1))
}

/// Serializes bars into `out` (cleared first).
///
/// Fails with `InvalidConfig` unless `STORE_RAW_BINARY` is set: this
/// serializer only owns the raw layout.
pub fn serialize_bars(
    bars: &[MarketBar],
    config: &BarCodecConfig,
    out: &mut Vec<u8>,
) -> Result<()> {
    config.validate()?;
    if !config.has_flag(BarStorageFlags::StoreRawBinary) {
        return Err(DataFeedError::InvalidConfig(
            "raw bar serializer requires STORE_RAW_BINARY".into(),
        ));
    }
    let duration_ms = config.time_frame.segment_duration_ms()?;

    out.clear();
    out.reserve(bars.len() * BAR_RECORD_SIZE + 32);
    out.push(SIGNATURE_BAR_RAW_V1);
    append_vbyte_u32(out, bars.len() as u32);

    let has = |flag| config.has_flag(flag) as u8;
    let mut header = config.price_digits & 0x1F;
    header |= has(BarStorageFlags::BidBased) << 5;
    header |= has(BarStorageFlags::AskBased) << 6;
    header |= has(BarStorageFlags::LastBased) << 7;
    out.push(header);

    header = config.volume_digits & 0x1F;
    header |= has(BarStorageFlags::EnableVolume) << 5;
    header |= has(BarStorageFlags::EnableQuoteVolume) << 6;
    header |= has(BarStorageFlags::EnableTickVolume) << 7;
    out.push(header);

    header = config.quote_volume_digits & 0x1F;
    header |= has(BarStorageFlags::EnableBuyVolume) << 5;
    header |= has(BarStorageFlags::EnableBuyQuoteVolume) << 6;
    header |= has(BarStorageFlags::EnableSpread) << 7;
    out.push(header);

    header = 0;
    header |= has(BarStorageFlags::SpreadLast) << 4;
    header |= has(BarStorageFlags::SpreadAvg) << 5;
    header |= has(BarStorageFlags::SpreadMax) << 6;
    header |= has(BarStorageFlags::FinalizedBars) << 7;
    out.push(header);

    append_vbyte_u32(out, config.time_frame as u32);

    let base_unix_interval = bars.first().map(|b| b.time_ms / duration_ms).unwrap_or(0);
    let base_unix_time = base_unix_interval * duration_ms;
    append_vbyte_u32(out, base_unix_interval as u32);
    append_vbyte_u64(
        out,
        zigzag_encode_i64(config.expiration_time_ms as i64 - base_unix_time as i64),
    );
    append_vbyte_u64(
        out,
        zigzag_encode_i64(config.next_expiration_time_ms as i64 - base_unix_time as i64),
    );

    for bar in bars {
        out.extend_from_slice(&bar.time_ms.to_le_bytes());
        out.extend_from_slice(&bar.open.to_le_bytes());
        out.extend_from_slice(&bar.high.to_le_bytes());
        out.extend_from_slice(&bar.low.to_le_bytes());
        out.extend_from_slice(&bar.close.to_le_bytes());
        out.extend_from_slice(&bar.volume.to_le_bytes());
        out.extend_from_slice(&bar.quote_volume.to_le_bytes());
        out.extend_from_slice(&bar.buy_volume.to_le_bytes());
        out.extend_from_slice(&bar.buy_quote_volume.to_le_bytes());
        out.extend_from_slice(&bar.spread.to_le_bytes());
        out.extend_from_slice(&bar.tick_volume.to_le_bytes());
    }
    Ok(())
}

/// Deserializes a bar blob, appending to `bars` and overwriting `config`.
pub fn deserialize_bars(
    input: &[u8],
    bars: &mut Vec<MarketBar>,
    config: &mut BarCodecConfig,
) -> Result<()> {
    let mut reader = ByteReader::new(input);
    let signature = reader.read_u8()?;
    if signature != SIGNATURE_BAR_RAW_V1 {
        return Err(DataFeedError::BadSignature(signature));
    }

    let count = reader.read_vbyte_u32()? as usize;
    if count > MAX_BAR_COUNT {
        return Err(DataFeedError::Overflow(format!(
            "bar count {} exceeds limit",
            count
        )));
    }

    let mut decoded_config = BarCodecConfig::default();
    let header = reader.read_u8()?;
    decoded_config.price_digits = header & 0x1F;
    let mut set = |cfg: &mut BarCodecConfig, bit: bool, flag| {
        if bit {
            cfg.set_flag(flag);
        }
    };
    set(&mut decoded_config, header & 0x20 != 0, BarStorageFlags::BidBased);
    set(&mut decoded_config, header & 0x40 != 0, BarStorageFlags::AskBased);
    set(&mut decoded_config, header & 0x80 != 0, BarStorageFlags::LastBased);

    let header = reader.read_u8()?;
    decoded_config.volume_digits = header & 0x1F;
    set(&mut decoded_config, header & 0x20 != 0, BarStorageFlags::EnableVolume);
    set(&mut decoded_config, header & 0x40 != 0, BarStorageFlags::EnableQuoteVolume);
    set(&mut decoded_config, header & 0x80 != 0, BarStorageFlags::EnableTickVolume);

    let header = reader.read_u8()?;
    decoded_config.quote_volume_digits = header & 0x1F;
    set(&mut decoded_config, header & 0x20 != 0, BarStorageFlags::EnableBuyVolume);
    set(&mut decoded_config, header & 0x40 != 0, BarStorageFlags::EnableBuyQuoteVolume);
    set(&mut decoded_config, header & 0x80 != 0, BarStorageFlags::EnableSpread);

    let header = reader.read_u8()?;
    set(&mut decoded_config, header & 0x10 != 0, BarStorageFlags::SpreadLast);
    set(&mut decoded_config, header & 0x20 != 0, BarStorageFlags::SpreadAvg);
    set(&mut decoded_config, header & 0x40 != 0, BarStorageFlags::SpreadMax);
    set(&mut decoded_config, header & 0x80 != 0, BarStorageFlags::FinalizedBars);
    decoded_config.set_flag(BarStorageFlags::StoreRawBinary);

    decoded_config.time_frame = TimeFrame::from_secs(reader.read_vbyte_u32()?);
    let duration_ms = decoded_config.time_frame.segment_duration_ms()?;
    let base_unix_time = u64::from(reader.read_vbyte_u32()?) * duration_ms;
    decoded_config.expiration_time_ms =
        (base_unix_time as i64 + zigzag_decode_u64(reader.read_vbyte_u64()?)) as u64;
    decoded_config.next_expiration_time_ms =
        (base_unix_time as i64 + zigzag_decode_u64(reader.read_vbyte_u64()?)) as u64;
    decoded_config.validate()?;

    let mut decoded = Vec::with_capacity(count);
    for _ in 0..count {
        let record = reader.read_bytes(BAR_RECORD_SIZE)?;
        let f64_at = |o: usize| f64::from_le_bytes(record[o..o + 8].try_into().unwrap());
        let u32_at = |o: usize| u32::from_le_bytes(record[o..o + 4].try_into().unwrap());
        decoded.push(MarketBar {
            time_ms: u64::from_le_bytes(record[0..8].try_into().unwrap()),
            open: f64_at(8),
            high: f64_at(16),
            low: f64_at(24),
            close: f64_at(32),
            volume: f64_at(40),
            quote_volume: f64_at(48),
            buy_volume: f64_at(56),
            buy_quote_volume: f64_at(64),
            spread: u32_at(72),
            tick_volume: u32_at(76),
        });
    }

    bars.extend_from_slice(&decoded);
    *config = decoded_config;
    Ok(())
}
