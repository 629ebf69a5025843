//! Funding rate entities and exchange payment formulas.

use serde::{Deserialize, Serialize};

/// Funding rate observation for a perpetual contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    /// Funding rate for the period (fractional, not percent).
    pub rate: f64,
    /// Mark price at the funding timestamp.
    pub mark_price: f64,
    /// Funding timestamp in milliseconds since the Unix epoch.
    pub time_ms: u64,
    /// Funding period duration in milliseconds.
    pub period_ms: u64,
}

/// Size of the packed funding rate record.
pub const FUNDING_RATE_SIZE: usize = 32;

impl FundingRate {
    /// Packs the record into its fixed little-endian layout.
    pub fn to_bytes(&self) -> [u8; FUNDING_RATE_SIZE] {
        let mut out = [0u8; FUNDING_RATE_SIZE];
        out[0..8].copy_from_slice(&self.rate.to_le_bytes());
        out[8..16].copy_from_slice(&self.mark_price.to_le_bytes());
        out[16..24].copy_from_slice(&self.time_ms.to_le_bytes());
        out[24..32].copy_from_slice(&self.period_ms.to_le_bytes());
        out
    }

    /// Unpacks a record from its fixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FUNDING_RATE_SIZE {
            return None;
        }
        Some(Self {
            rate: f64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            mark_price: f64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            time_ms: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            period_ms: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        })
    }
}

/// An ordered run of funding rates for one symbol on one provider.
#[derive(Debug, Clone, Default)]
pub struct FundingRateSequence {
    /// Rates in strictly increasing `time_ms` order.
    pub rates: Vec<FundingRate>,
    /// Symbol index within the owning universe.
    pub symbol_index: u16,
    /// Provider index within the owning universe.
    pub provider_index: u16,
}

/// Size of the packed funding metadata record.
pub const FUNDING_METADATA_SIZE: usize = 64;

/// Per-(symbol, provider) funding dataset metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FundingMetadata {
    /// First stored funding timestamp.
    pub start_ts: u64,
    /// Last stored funding timestamp.
    pub end_ts: u64,
    /// Nominal funding period in milliseconds.
    pub period_ms: u64,
    /// Dataset status flags.
    pub flags: u64,
    /// Symbol identifier.
    pub symbol_id: u16,
    /// Provider identifier.
    pub provider_id: u16,
}

impl FundingMetadata {
    /// Packs the record into its fixed little-endian layout.
    pub fn to_bytes(&self) -> [u8; FUNDING_METADATA_SIZE] {
        let mut out = [0u8; FUNDING_METADATA_SIZE];
        out[0..8].copy_from_slice(&self.start_ts.to_le_bytes());
        out[8..16].copy_from_slice(&self.end_ts.to_le_bytes());
        out[16..24].copy_from_slice(&self.period_ms.to_le_bytes());
        out[24..32].copy_from_slice(&self.flags.to_le_bytes());
        out[32..34].copy_from_slice(&self.symbol_id.to_le_bytes());
        out[34..36].copy_from_slice(&self.provider_id.to_le_bytes());
        out
    }

    /// Unpacks a record from its fixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FUNDING_METADATA_SIZE {
            return None;
        }
        let u64_at = |o: usize| u64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        let u16_at = |o: usize| u16::from_le_bytes(bytes[o..o + 2].try_into().unwrap());
        Some(Self {
            start_ts: u64_at(0),
            end_ts: u64_at(8),
            period_ms: u64_at(16),
            flags: u64_at(24),
            symbol_id: u16_at(32),
            provider_id: u16_at(34),
        })
    }
}

/// Exchange funding payment convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingCalcType {
    /// Premium index scales the rate multiplicatively.
    #[default]
    Binance,
    /// Premium index adds to the rate.
    Bybit,
}

/// A funding observation paired with everything needed to settle it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingDetails {
    /// The funding rate observation.
    pub rate: FundingRate,
    /// Premium index at the funding timestamp (0 when unavailable).
    pub premium_index: f64,
    /// Payment convention of the venue.
    pub calc_type: FundingCalcType,
}

impl FundingDetails {
    /// Funding payment for a position of `position_size` base units.
    /// Positive values are paid by longs.
    pub fn payment(&self, position_size: f64) -> f64 {
        match self.calc_type {
            FundingCalcType::Binance => {
                binance_funding_payment(&self.rate, self.premium_index, position_size)
            }
            FundingCalcType::Bybit => {
                bybit_funding_payment(&self.rate, self.premium_index, position_size)
            }
        }
    }
}

const STANDARD_FUNDING_PERIOD_MS: u64 = 8 * 3_600 * 1_000;

/// Binance-style funding payment.
///
/// A non-zero premium index scales the rate multiplicatively. The payment
/// is pro-rated by the actual period relative to the standard 8 hours.
pub fn binance_funding_payment(rate: &FundingRate, premium_index: f64, position_size: f64) -> f64 {
    let effective_rate = if premium_index != 0.0 {
        rate.rate * (1.0 + premium_index)
    } else {
        rate.rate
    };
    (position_size * rate.mark_price)
        * effective_rate
        * (rate.period_ms as f64 / STANDARD_FUNDING_PERIOD_MS as f64)
}

/// Bybit-style funding payment.
///
/// A non-zero premium index is added to the rate.
pub fn bybit_funding_payment(rate: &FundingRate, premium_index: f64, position_size: f64) -> f64 {
    let effective_rate = if premium_index != 0.0 {
        rate.rate + premium_index
    } else {
        rate.rate
    };
    (position_size * rate.mark_price)
        * effective_rate
        * (rate.period_ms as f64 / STANDARD_FUNDING_PERIOD_MS as f64)
}
