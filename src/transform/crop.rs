//! Binary-search time cropping for sorted series.

use crate::data::bars::MarketBar;
use crate::data::ticks::MarketTick;

/// Keeps only ticks with `start_ms <= time_ms < end_ms`.
///
/// The input must be sorted by `time_ms`; both cuts are binary searches.
pub fn crop_ticks_by_time(ticks: &mut Vec<MarketTick>, start_ms: u64, end_ms: u64) {
    let tail = ticks.partition_point(|t| t.time_ms < end_ms);
    ticks.truncate(tail);
    let head = ticks.partition_point(|t| t.time_ms < start_ms);
    if head > 0 {
        ticks.drain(..head);
    }
}

/// Keeps only bars with `start_ms <= time_ms < end_ms`.
pub fn crop_bars_by_time(bars: &mut Vec<MarketBar>, start_ms: u64, end_ms: u64) {
    let tail = bars.partition_point(|b| b.time_ms < end_ms);
    bars.truncate(tail);
    let head = bars.partition_point(|b| b.time_ms < start_ms);
    if head > 0 {
        bars.drain(..head);
    }
}
