//! Bybit futures trade export parser.
//!
//! Columns: `timestamp, symbol, side, size, price, tickDirection,
//! trdMatchID, grossValue, homeNotional, foreignNotional`. Timestamps
//! are fractional seconds. Price and volume precision are auto-detected
//! by scanning decimal counts over the leading rows.

use crate::data::ticks::{MarketTick, TickSequence, TickUpdateFlags};
use crate::error::{DataFeedError, Result};
use crate::ingest::decimal_digits;

/// Default number of rows scanned for precision auto-detection.
pub const PRECISION_SCAN_ROWS: usize = 3_000_000;

fn field<'r>(record: &'r csv::StringRecord, row: usize, i: usize) -> Result<&'r str> {
    record
        .get(i)
        .ok_or_else(|| DataFeedError::Parse(format!("bybit row {row}: missing column {i}")))
}

/// Parses a decompressed Bybit futures trade CSV into a tick sequence.
pub fn parse_bybit_trades(csv_text: &[u8], precision_scan_rows: usize) -> Result<TickSequence> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(csv_text);

    let mut sequence = TickSequence::default();
    let mut price_digits = 0u8;
    let mut volume_digits = 0u8;
    let mut prev_price: Option<f64> = None;

    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| DataFeedError::Parse(format!("bybit row {row}: {err}")))?;

        let timestamp: f64 = field(&record, row, 0)?
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("bybit row {row}: bad timestamp")))?;
        let side = field(&record, row, 2)?;
        let size_text = field(&record, row, 3)?;
        let price_text = field(&record, row, 4)?;
        let tick_direction = field(&record, row, 5)?;

        let size: f64 = size_text
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("bybit row {row}: bad size")))?;
        let price: f64 = price_text
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("bybit row {row}: bad price")))?;

        if row < precision_scan_rows {
            price_digits = price_digits.max(decimal_digits(price_text));
            volume_digits = volume_digits.max(decimal_digits(size_text));
        }

        let mut tick = MarketTick::trade(price, size, (timestamp * 1000.0).round() as u64, 0);
        match side {
            "Buy" => tick.set_flag(TickUpdateFlags::TickFromBuy),
            "Sell" => tick.set_flag(TickUpdateFlags::TickFromSell),
            other => {
                return Err(DataFeedError::Parse(format!(
                    "bybit row {row}: unknown side {other:?}"
                )))
            }
        }
        // PlusTick/MinusTick mark a price change; ZeroPlusTick and
        // ZeroMinusTick repeat the previous price.
        if matches!(tick_direction, "PlusTick" | "MinusTick") && prev_price.is_some() {
            tick.set_flag(TickUpdateFlags::LastUpdated);
        }
        prev_price = Some(price);
        sequence.ticks.push(tick);
    }

    // Daily exports occasionally arrive newest-first; replay needs
    // non-decreasing time.
    if sequence
        .ticks
        .windows(2)
        .any(|w| w[0].time_ms > w[1].time_ms)
    {
        sequence.ticks.sort_by_key(|t| t.time_ms);
    }

    sequence.price_digits = price_digits;
    sequence.volume_digits = volume_digits;
    Ok(sequence)
}
