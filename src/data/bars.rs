//! Bar entities: OHLCV bars, timeframes, storage flags, codec config, and
//! the fixed-size metadata record.

use serde::{Deserialize, Serialize};

use crate::error::{DataFeedError, Result};
use crate::utils::math::MAX_DIGITS;

/// Standard bar timeframes, represented by their length in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TimeFrame {
    /// Unknown timeframe.
    #[default]
    Unknown = 0,
    /// 1 second.
    S1 = 1,
    /// 3 seconds.
    S3 = 3,
    /// 5 seconds.
    S5 = 5,
    /// 15 seconds.
    S15 = 15,
    /// 1 minute.
    M1 = 60,
    /// 5 minutes.
    M5 = 300,
    /// 15 minutes.
    M15 = 900,
    /// 30 minutes.
    M30 = 1800,
    /// 1 hour.
    H1 = 3600,
    /// 4 hours.
    H4 = 14_400,
    /// 1 day.
    D1 = 86_400,
    /// 1 week.
    W1 = 604_800,
    /// 1 month (30 days).
    MN1 = 2_592_000,
}

impl TimeFrame {
    /// Bar length in milliseconds.
    #[inline]
    pub fn duration_ms(self) -> u64 {
        self as u32 as u64 * 1000
    }

    /// Recovers a timeframe from its length in seconds.
    pub fn from_secs(sec: u32) -> TimeFrame {
        match sec {
            1 => TimeFrame::S1,
            3 => TimeFrame::S3,
            5 => TimeFrame::S5,
            15 => TimeFrame::S15,
            60 => TimeFrame::M1,
            300 => TimeFrame::M5,
            900 => TimeFrame::M15,
            1800 => TimeFrame::M30,
            3600 => TimeFrame::H1,
            14_400 => TimeFrame::H4,
            86_400 => TimeFrame::D1,
            604_800 => TimeFrame::W1,
            2_592_000 => TimeFrame::MN1,
            _ => TimeFrame::Unknown,
        }
    }

    /// Storage segment duration for this timeframe.
    ///
    /// Second-scale frames pack into hour segments, minute/hour frames
    /// into day segments, and H4/D1 into week segments. Tick streams use
    /// hour segments regardless.
    pub fn segment_duration_ms(self) -> Result<u64> {
        use TimeFrame::*;
        match self {
            S1 | S3 | S5 | S15 => Ok(3_600_000),
            M1 | M5 | M15 | M30 | H1 => Ok(86_400_000),
            H4 | D1 => Ok(604_800_000),
            _ => Err(DataFeedError::InvalidConfig(format!(
                "timeframe {:?} is not segmentable",
                self
            ))),
        }
    }

    /// True when the timeframe can be stored in segments.
    pub fn is_segmentable(self) -> bool {
        self.segment_duration_ms().is_ok()
    }
}

/// Flags controlling bar encoding and interpretation (u32 bitset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BarStorageFlags {
    /// Bar prices are based on bid prices.
    BidBased = 1 << 0,
    /// Bar prices are based on ask prices.
    AskBased = 1 << 1,
    /// Bar prices are based on last trade prices.
    LastBased = 1 << 2,
    /// Store the traded volume column.
    EnableVolume = 1 << 3,
    /// Store the quote volume column.
    EnableQuoteVolume = 1 << 4,
    /// Store the tick volume column.
    EnableTickVolume = 1 << 5,
    /// Store the taker buy volume column.
    EnableBuyVolume = 1 << 6,
    /// Store the taker buy quote volume column.
    EnableBuyQuoteVolume = 1 << 7,
    /// Store the spread column (tick units).
    EnableSpread = 1 << 8,
    /// Spread is the last value in the interval.
    SpreadLast = 1 << 9,
    /// Spread is the average over the interval.
    SpreadAvg = 1 << 10,
    /// Spread is the maximum in the interval.
    SpreadMax = 1 << 11,
    /// Store raw binary records without compression.
    StoreRawBinary = 1 << 12,
    /// Every bar in the dataset is finalized.
    FinalizedBars = 1 << 13,
}

/// A single market bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    /// Start time of the bar in milliseconds since the Unix epoch.
    pub time_ms: u64,
    /// Open price.
    pub open: f64,
    /// Highest price during the bar.
    pub high: f64,
    /// Lowest price during the bar.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume in base units.
    pub volume: f64,
    /// Traded volume in quote units.
    pub quote_volume: f64,
    /// Taker buy volume in base units.
    pub buy_volume: f64,
    /// Taker buy volume in quote units.
    pub buy_quote_volume: f64,
    /// Spread in tick units.
    pub spread: u32,
    /// Number of price updates during the bar.
    pub tick_volume: u32,
}

/// Configuration for bar serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BarCodecConfig {
    /// Minimum price increment (0 = derive from `price_digits`).
    pub tick_size: f64,
    /// Futures expiration time (0 for perpetual or spot).
    pub expiration_time_ms: u64,
    /// Expiration time of the next contract (0 if unknown).
    pub next_expiration_time_ms: u64,
    /// Aggregation timeframe.
    pub time_frame: TimeFrame,
    /// Bitset of [`BarStorageFlags`].
    pub flags: u32,
    /// Number of decimal places for prices.
    pub price_digits: u8,
    /// Number of decimal places for base volumes.
    pub volume_digits: u8,
    /// Number of decimal places for quote volumes.
    pub quote_volume_digits: u8,
}

impl BarCodecConfig {
    /// Sets a flag.
    #[inline]
    pub fn set_flag(&mut self, flag: BarStorageFlags) {
        self.flags |= flag as u32;
    }

    /// Clears a flag.
    #[inline]
    pub fn clear_flag(&mut self, flag: BarStorageFlags) {
        self.flags &= !(flag as u32);
    }

    /// Tests a flag.
    #[inline]
    pub fn has_flag(&self, flag: BarStorageFlags) -> bool {
        self.flags & (flag as u32) != 0
    }

    /// Validates precision bounds and price-basis exclusivity.
    pub fn validate(&self) -> Result<()> {
        if self.price_digits > MAX_DIGITS
            || self.volume_digits > MAX_DIGITS
            || self.quote_volume_digits > MAX_DIGITS
        {
            return Err(DataFeedError::InvalidConfig(
                "bar digit field exceeds maximum precision".into(),
            ));
        }
        let basis_bits = (self.has_flag(BarStorageFlags::BidBased) as u8)
            + (self.has_flag(BarStorageFlags::AskBased) as u8)
            + (self.has_flag(BarStorageFlags::LastBased) as u8);
        if basis_bits > 1 {
            return Err(DataFeedError::InvalidConfig(
                "price basis flags are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// An ordered run of bars for one symbol on one provider.
#[derive(Debug, Clone, Default)]
pub struct BarSequence {
    /// Bars in strictly increasing `time_ms` order.
    pub bars: Vec<MarketBar>,
    /// Symbol index within the owning universe.
    pub symbol_index: u16,
    /// Provider index within the owning universe.
    pub provider_index: u16,
    /// Codec configuration the bars were produced with.
    pub config: BarCodecConfig,
}

/// Size of the packed bar metadata record.
pub const BAR_METADATA_SIZE: usize = 64;

/// Per-(symbol, provider, timeframe) bar dataset metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarMetadata {
    /// First stored bar timestamp.
    pub start_ts: u64,
    /// Last stored bar timestamp.
    pub end_ts: u64,
    /// Futures expiration time (0 for perpetual or spot).
    pub expiration_time_ms: u64,
    /// Expiration time of the next contract (0 if unknown).
    pub next_expiration_time_ms: u64,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Aggregation timeframe.
    pub time_frame: TimeFrame,
    /// Bitset of [`BarStorageFlags`].
    pub flags: u32,
    /// Number of bars in the dataset.
    pub count: u32,
    /// Symbol identifier.
    pub symbol_id: u16,
    /// Provider identifier.
    pub provider_id: u16,
    /// Number of decimal places for prices.
    pub price_digits: u8,
    /// Number of decimal places for base volumes.
    pub volume_digits: u8,
    /// Number of decimal places for quote volumes.
    pub quote_volume_digits: u8,
}

impl BarMetadata {
    /// Packs the record into its fixed little-endian layout.
    pub fn to_bytes(&self) -> [u8; BAR_METADATA_SIZE] {
        let mut out = [0u8; BAR_METADATA_SIZE];
        out[0..8].copy_from_slice(&self.start_ts.to_le_bytes());
        out[8..16].copy_from_slice(&self.end_ts.to_le_bytes());
        out[16..24].copy_from_slice(&self.expiration_time_ms.to_le_bytes());
        out[24..32].copy_from_slice(&self.next_expiration_time_ms.to_le_bytes());
        out[32..40].copy_from_slice(&self.tick_size.to_le_bytes());
        out[40..44].copy_from_slice(&(self.time_frame as u32).to_le_bytes());
        out[44..48].copy_from_slice(&self.flags.to_le_bytes());
        out[48..52].copy_from_slice(&self.count.to_le_bytes());
        out[52..54].copy_from_slice(&self.symbol_id.to_le_bytes());
        out[54..56].copy_from_slice(&self.provider_id.to_le_bytes());
        out[56] = self.price_digits;
        out[57] = self.volume_digits;
        out[58] = self.quote_volume_digits;
        out
    }

    /// Unpacks a record from its fixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BAR_METADATA_SIZE {
            return None;
        }
        let u64_at = |o: usize| u64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        let u32_at = |o: usize| u32::from_le_bytes(bytes[o..o + 4].try_into().unwrap());
        let u16_at = |o: usize| u16::from_le_bytes(bytes[o..o + 2].try_into().unwrap());
        Some(Self {
            start_ts: u64_at(0),
            end_ts: u64_at(8),
            expiration_time_ms: u64_at(16),
            next_expiration_time_ms: u64_at(24),
            tick_size: f64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            time_frame: TimeFrame::from_secs(u32_at(40)),
            flags: u32_at(44),
            count: u32_at(48),
            symbol_id: u16_at(52),
            provider_id: u16_at(54),
            price_digits: bytes[56],
            volume_digits: bytes[57],
            quote_volume_digits: bytes[58],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_durations() {
        assert_eq!(TimeFrame::S5.segment_duration_ms().unwrap(), 3_600_000);
        assert_eq!(TimeFrame::M5.segment_duration_ms().unwrap(), 86_400_000);
        assert_eq!(TimeFrame::D1.segment_duration_ms().unwrap(), 604_800_000);
        assert!(TimeFrame::W1.segment_duration_ms().is_err());
    }

    #[test]
    fn test_basis_exclusivity() {
        let mut cfg = BarCodecConfig::default();
        cfg.set_flag(BarStorageFlags::LastBased);
        assert!(cfg.validate().is_ok());
        cfg.set_flag(BarStorageFlags::BidBased);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = BarCodecConfig {
            time_frame: TimeFrame::M5,
            price_digits: 2,
            ..Default::default()
        };
        config.set_flag(BarStorageFlags::LastBased);
        let json = serde_json::to_string(&config).unwrap();
        let back: BarCodecConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_bar_metadata_roundtrip() {
        let meta = BarMetadata {
            start_ts: 1_700_000_000_000,
            end_ts: 1_700_086_400_000,
            expiration_time_ms: 0,
            next_expiration_time_ms: 0,
            tick_size: 0.5,
            time_frame: TimeFrame::M5,
            flags: BarStorageFlags::LastBased as u32 | BarStorageFlags::EnableVolume as u32,
            count: 288,
            symbol_id: 1,
            provider_id: 3,
            price_digits: 1,
            volume_digits: 3,
            quote_volume_digits: 2,
        };
        let back = BarMetadata::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(meta, back);
    }
}
