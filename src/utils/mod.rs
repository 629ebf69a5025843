//! Shared utilities: integer time math, fixed-point helpers, bitsets.

pub mod bitset;
pub mod math;
pub mod time;

pub use bitset::DynamicBitset;
pub use math::{compare_with_precision, median3, normalize_price, pow10_f64, pow10_u64, precision_tolerance};
pub use time::{
    hour_of_ms, ms_to_sec, start_of_day_ms, start_of_hour_ms, start_of_period_ms, MS_PER_DAY,
    MS_PER_HOUR, MS_PER_SEC, SEC_PER_HOUR,
};
