//! Exchange export ingest: container readers and CSV trade parsers.
//!
//! Parsers produce [`TickSequence`](crate::data::ticks::TickSequence)
//! values; they never touch storage directly.

pub mod binance;
pub mod bybit;
pub mod container;

pub use binance::{parse_binance_futures_trades, parse_binance_spot_trades};
pub use bybit::{parse_bybit_trades, PRECISION_SCAN_ROWS};
pub use container::{is_gzip, read_gzip, read_zip_first_entry};

/// Number of significant decimal places in a numeric text field
/// (trailing zeros do not count), capped at the supported precision.
pub(crate) fn decimal_digits(text: &str) -> u8 {
    text.split('.')
        .nth(1)
        .map(|frac| frac.trim_end_matches('0').len().min(18) as u8)
        .unwrap_or(0)
}
