//! Binance spot and futures trade export parsers.
//!
//! Monthly trade CSVs carry `id, price, qty, quote_qty, time,
//! is_buyer_maker[, is_best_match]` with no header row on spot exports
//! and an optional header on futures; a leading non-numeric row is
//! skipped either way. `is_buyer_maker == true` means the aggressor sold.

use crate::data::ticks::{MarketTick, TickSequence, TickUpdateFlags};
use crate::error::{DataFeedError, Result};
use crate::ingest::decimal_digits;
use crate::utils::math::compare_with_precision;

/// Parses a Binance spot trade CSV (7 columns, `isBestMatch` last).
pub fn parse_binance_spot_trades(csv_text: &[u8], precision_scan_rows: usize) -> Result<TickSequence> {
    parse_binance_trades(csv_text, precision_scan_rows, true)
}

/// Parses a Binance futures trade CSV (6 columns).
pub fn parse_binance_futures_trades(
    csv_text: &[u8],
    precision_scan_rows: usize,
) -> Result<TickSequence> {
    parse_binance_trades(csv_text, precision_scan_rows, false)
}

fn field<'r>(record: &'r csv::StringRecord, row: usize, i: usize) -> Result<&'r str> {
    record
        .get(i)
        .ok_or_else(|| DataFeedError::Parse(format!("binance row {row}: missing column {i}")))
}

fn parse_binance_trades(
    csv_text: &[u8],
    precision_scan_rows: usize,
    has_best_match: bool,
) -> Result<TickSequence> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text);

    let mut sequence = TickSequence::default();
    let mut price_digits = 0u8;
    let mut volume_digits = 0u8;
    let mut prev_price: Option<f64> = None;

    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| DataFeedError::Parse(format!("binance row {row}: {err}")))?;

        // A leading header row is legal; anything else non-numeric is not.
        if field(&record, row, 0)?.parse::<u64>().is_err() {
            if row == 0 {
                continue;
            }
            return Err(DataFeedError::Parse(format!(
                "binance row {row}: bad trade id"
            )));
        }

        let price_text = field(&record, row, 1)?;
        let qty_text = field(&record, row, 2)?;
        let price: f64 = price_text
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("binance row {row}: bad price")))?;
        let qty: f64 = qty_text
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("binance row {row}: bad quantity")))?;
        let time_ms: u64 = field(&record, row, 4)?
            .parse()
            .map_err(|_| DataFeedError::Parse(format!("binance row {row}: bad timestamp")))?;
        let is_buyer_maker = matches!(
            field(&record, row, 5)?.trim(),
            "true" | "True" | "TRUE" | "1"
        );

        if row < precision_scan_rows {
            price_digits = price_digits.max(decimal_digits(price_text));
            volume_digits = volume_digits.max(decimal_digits(qty_text));
        }

        let mut tick = MarketTick::trade(price, qty, time_ms, 0);
        if is_buyer_maker {
            tick.set_flag(TickUpdateFlags::TickFromSell);
        } else {
            tick.set_flag(TickUpdateFlags::TickFromBuy);
        }
        if has_best_match {
            if let Some(best) = record.get(6) {
                if matches!(best.trim(), "true" | "True" | "TRUE" | "1") {
                    tick.set_flag(TickUpdateFlags::BestMatch);
                }
            }
        }
        if let Some(prev) = prev_price {
            if !compare_with_precision(price, prev, price_digits.max(8)) {
                tick.set_flag(TickUpdateFlags::LastUpdated);
            }
        }
        prev_price = Some(price);
        sequence.ticks.push(tick);
    }

    sequence.price_digits = price_digits;
    sequence.volume_digits = volume_digits;
    Ok(sequence)
}
