//! Tick entities: the `MarketTick` record, per-tick flags, codec and
//! bid/ask reconstruction configs, and the fixed-size metadata record.

use serde::{Deserialize, Serialize};

use crate::utils::math::{precision_tolerance, MAX_DIGITS};

/// Per-tick update flags, stored as bits of `MarketTick::flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TickUpdateFlags {
    /// Bid price updated.
    BidUpdated = 1 << 0,
    /// Ask price updated.
    AskUpdated = 1 << 1,
    /// Last trade price updated.
    LastUpdated = 1 << 2,
    /// Volume updated.
    VolumeUpdated = 1 << 3,
    /// Tick resulted from a buy trade.
    TickFromBuy = 1 << 4,
    /// Tick resulted from a sell trade.
    TickFromSell = 1 << 5,
    /// Trade matched the best book price at execution time.
    BestMatch = 1 << 6,
}

/// Dataset-level status flags carried in tick metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TickStatusFlags {
    /// Data was received in real time.
    Realtime = 1 << 0,
    /// Data has been initialized from history.
    Initialized = 1 << 1,
}

/// A single market tick: trade print or quote update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    /// Ask price.
    pub ask: f64,
    /// Bid price.
    pub bid: f64,
    /// Price of the last trade.
    pub last: f64,
    /// Trade volume.
    pub volume: f64,
    /// Tick timestamp in milliseconds since the Unix epoch.
    pub time_ms: u64,
    /// Time the tick was received from the venue.
    pub received_ms: u64,
    /// Bitset of [`TickUpdateFlags`].
    pub flags: u64,
}

impl MarketTick {
    /// Creates a trade tick with the given side flag already set.
    pub fn trade(last: f64, volume: f64, time_ms: u64, flags: u64) -> Self {
        Self {
            ask: 0.0,
            bid: 0.0,
            last,
            volume,
            time_ms,
            received_ms: 0,
            flags,
        }
    }

    /// Sets a flag.
    #[inline]
    pub fn set_flag(&mut self, flag: TickUpdateFlags) {
        self.flags |= flag as u64;
    }

    /// Sets or clears a flag.
    #[inline]
    pub fn set_flag_value(&mut self, flag: TickUpdateFlags, value: bool) {
        if value {
            self.flags |= flag as u64;
        } else {
            self.flags &= !(flag as u64);
        }
    }

    /// Tests a flag.
    #[inline]
    pub fn has_flag(&self, flag: TickUpdateFlags) -> bool {
        self.flags & (flag as u64) != 0
    }
}

/// Parameters for tick encoding and decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCodecConfig {
    /// Number of decimal places for prices (max 18).
    pub price_digits: u8,
    /// Number of decimal places for volumes (max 18).
    pub volume_digits: u8,
    /// Optimize for trade-based data where only `last` prices exist.
    pub trade_based: bool,
    /// Encode and decode per-tick side flags.
    pub enable_tick_flags: bool,
    /// Include the `received_ms` field in the encoded data.
    pub enable_received_time: bool,
    /// Include the volume column in the encoded data.
    pub enable_volume: bool,
    /// Bypass the columnar pipeline and store raw binary records.
    pub store_raw_binary: bool,
}

impl TickCodecConfig {
    /// Validates precision bounds.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.price_digits > MAX_DIGITS || self.volume_digits > MAX_DIGITS {
            return Err(crate::error::DataFeedError::InvalidConfig(format!(
                "price_digits={} volume_digits={} exceed maximum of {}",
                self.price_digits, self.volume_digits, MAX_DIGITS
            )));
        }
        Ok(())
    }
}

/// Algorithm for restoring bid/ask prices from trade prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidAskModel {
    /// Leave bid/ask as stored.
    #[default]
    None,
    /// Apply a fixed spread around the last price.
    FixedSpread,
    /// Track the spread observed at buy/sell transitions.
    DynamicSpread,
    /// Median-filter the spread observed at buy/sell transitions.
    MedianSpread,
}

/// Parameters for bid/ask reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BidAskRestoreConfig {
    /// Restoration algorithm.
    pub mode: BidAskModel,
    /// Fixed spread in price points (seed value for the dynamic models).
    pub fixed_spread: u32,
    /// Price precision override; zero falls back to the codec precision.
    pub price_digits: u8,
}

/// Borrowed view over a contiguous run of buffered ticks.
///
/// Valid only until the owning buffer reloads or appends; the buffer APIs
/// enforce this through the borrow checker.
pub type MarketTickSpan<'a> = &'a [MarketTick];

/// An ordered run of ticks for one symbol on one provider.
#[derive(Debug, Clone, Default)]
pub struct TickSequence {
    /// Ticks in non-decreasing `time_ms` order.
    pub ticks: Vec<MarketTick>,
    /// Symbol index within the owning universe.
    pub symbol_index: u16,
    /// Provider index within the owning universe.
    pub provider_index: u16,
    /// Number of decimal places for prices.
    pub price_digits: u8,
    /// Number of decimal places for volumes.
    pub volume_digits: u8,
}

/// Size of the packed metadata record.
pub const TICK_METADATA_SIZE: usize = 64;

/// Per-(symbol, provider) tick dataset metadata.
///
/// Persisted as a fixed 64-byte little-endian record; mutated by upsert,
/// never by reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickMetadata {
    /// First stored tick timestamp.
    pub start_ts: u64,
    /// Last stored tick timestamp.
    pub end_ts: u64,
    /// Minimum price increment implied by `price_digits`.
    pub price_tick_size: f64,
    /// Minimum volume increment implied by `volume_digits`.
    pub volume_step_size: f64,
    /// Dataset status flags ([`TickStatusFlags`]) and codec flag echo.
    pub flags: u64,
    /// Symbol identifier.
    pub symbol_id: u16,
    /// Provider identifier.
    pub provider_id: u16,
    /// Number of decimal places for prices.
    pub price_digits: u8,
    /// Number of decimal places for volumes.
    pub volume_digits: u8,
}

impl TickMetadata {
    /// Builds a fresh record from a codec config.
    pub fn from_config(
        symbol_id: u16,
        provider_id: u16,
        config: &TickCodecConfig,
        start_ts: u64,
        end_ts: u64,
    ) -> Self {
        Self {
            start_ts,
            end_ts,
            price_tick_size: precision_tolerance(config.price_digits),
            volume_step_size: precision_tolerance(config.volume_digits),
            flags: 0,
            symbol_id,
            provider_id,
            price_digits: config.price_digits,
            volume_digits: config.volume_digits,
        }
    }

    /// Packs the record into its fixed little-endian layout.
    pub fn to_bytes(&self) -> [u8; TICK_METADATA_SIZE] {
        let mut out = [0u8; TICK_METADATA_SIZE];
        out[0..8].copy_from_slice(&self.start_ts.to_le_bytes());
        out[8..16].copy_from_slice(&self.end_ts.to_le_bytes());
        out[16..24].copy_from_slice(&self.price_tick_size.to_le_bytes());
        out[24..32].copy_from_slice(&self.volume_step_size.to_le_bytes());
        out[32..40].copy_from_slice(&self.flags.to_le_bytes());
        out[40..42].copy_from_slice(&self.symbol_id.to_le_bytes());
        out[42..44].copy_from_slice(&self.provider_id.to_le_bytes());
        out[44] = self.price_digits;
        out[45] = self.volume_digits;
        out
    }

    /// Unpacks a record from its fixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TICK_METADATA_SIZE {
            return None;
        }
        let u64_at = |o: usize| u64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        let f64_at = |o: usize| f64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        let u16_at = |o: usize| u16::from_le_bytes(bytes[o..o + 2].try_into().unwrap());
        Some(Self {
            start_ts: u64_at(0),
            end_ts: u64_at(8),
            price_tick_size: f64_at(16),
            volume_step_size: f64_at(24),
            flags: u64_at(32),
            symbol_id: u16_at(40),
            provider_id: u16_at(42),
            price_digits: bytes[44],
            volume_digits: bytes[45],
        })
    }
}
