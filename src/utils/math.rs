//! Fixed-point price/volume helpers.
//!
//! Prices and volumes travel as `f64` but are compared and stored at a
//! declared decimal precision. All scaling goes through the power tables
//! here so the codec and the spread processors agree bit-for-bit.

/// Largest supported decimal precision for prices and volumes.
pub const MAX_DIGITS: u8 = 18;

const POW10_U64: [u64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

/// `10^digits` as an integer. `digits` must be `<= 18`.
#[inline]
pub fn pow10_u64(digits: u8) -> u64 {
    POW10_U64[digits as usize]
}

/// `10^digits` as a float. `digits` must be `<= 18`.
#[inline]
pub fn pow10_f64(digits: u8) -> f64 {
    POW10_U64[digits as usize] as f64
}

/// Smallest representable step at the given precision (`10^-digits`).
#[inline]
pub fn precision_tolerance(digits: u8) -> f64 {
    1.0 / pow10_f64(digits)
}

/// Rounds a value to the given decimal precision (half away from zero).
#[inline]
pub fn normalize_price(value: f64, digits: u8) -> f64 {
    let scale = pow10_f64(digits);
    (value * scale).round() / scale
}

/// Scales a value to integer units at the given precision.
#[inline]
pub fn scale_to_i64(value: f64, digits: u8) -> i64 {
    (value * pow10_f64(digits)).round() as i64
}

/// Equality at a declared precision: `|a - b| < 0.5 * 10^-digits`.
#[inline]
pub fn compare_with_precision(a: f64, b: f64, digits: u8) -> bool {
    (a - b).abs() < 0.5 * precision_tolerance(digits)
}

/// Median of three values.
#[inline]
pub fn median3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}
