//! Segment splitting for the storage layer.
//!
//! A batch is split into index ranges, one per storage segment window,
//! with time-ordering validated in the same scan. Replacement is always
//! whole-segment: the storage layer overwrites each touched window with
//! the produced range.

use std::ops::Range;

use crate::data::bars::{MarketBar, TimeFrame};
use crate::data::funding::FundingRate;
use crate::data::ticks::MarketTick;
use crate::error::{DataFeedError, Result};
use crate::utils::time::{day_of_ms, hour_of_ms};

fn split_by_window<T>(
    items: &[T],
    time_of: impl Fn(&T) -> u64,
    window_of: impl Fn(u64) -> u64,
    strict: bool,
) -> Result<Vec<Range<usize>>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut seg_start = 0usize;
    let mut current_window = window_of(time_of(&items[0]));

    for i in 1..items.len() {
        let prev = time_of(&items[i - 1]);
        let cur = time_of(&items[i]);
        if cur < prev || (strict && cur == prev) {
            return Err(DataFeedError::OutOfOrder(i));
        }
        let window = window_of(cur);
        if window != current_window {
            segments.push(seg_start..i);
            seg_start = i;
            current_window = window;
        }
    }
    segments.push(seg_start..items.len());
    Ok(segments)
}

/// Splits ticks into hour segments. Equal timestamps are legal (same-ms
/// bursts); backwards time is `OutOfOrder`.
pub fn split_ticks_by_hour(ticks: &[MarketTick]) -> Result<Vec<Range<usize>>> {
    split_by_window(ticks, |t| t.time_ms, hour_of_ms, false)
}

/// Splits bars into their timeframe-dependent segments. Bar open times
/// must be strictly increasing.
pub fn split_bars_by_segment(bars: &[MarketBar], time_frame: TimeFrame) -> Result<Vec<Range<usize>>> {
    let duration = time_frame.segment_duration_ms()?;
    split_by_window(bars, |b| b.time_ms, move |t| t / duration, true)
}

/// Splits funding rates into day segments with strictly increasing times.
pub fn split_rates_by_day(rates: &[FundingRate]) -> Result<Vec<Range<usize>>> {
    split_by_window(rates, |r| r.time_ms, day_of_ms, true)
}
