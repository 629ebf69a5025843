//! Bar resampling to coarser timeframes.
//!
//! Precondition: the input is gapless and aligned (run
//! [`fill_bar_gaps`](crate::transform::gap_fill::fill_bar_gaps) first).
//! The core does not verify gaplessness; a gappy input simply produces
//! bars aggregated from whatever fell into each window.

use crate::data::bars::{BarStorageFlags, MarketBar, TimeFrame};
use crate::error::{DataFeedError, Result};
use crate::utils::time::start_of_period_ms;

/// Spread aggregation over a resampled window, selected by the config
/// flags (`SPREAD_LAST` is the default).
fn aggregate_spread(current: u32, incoming: u32, count: u64, flags: u32) -> u32 {
    if flags & BarStorageFlags::SpreadMax as u32 != 0 {
        current.max(incoming)
    } else if flags & BarStorageFlags::SpreadAvg as u32 != 0 {
        // Running average in integer tick units.
        (((u64::from(current) * count) + u64::from(incoming)) / (count + 1)) as u32
    } else {
        incoming
    }
}

/// Resamples bars from `from` to the coarser `to` timeframe.
pub fn resample_market_bars(
    bars: &[MarketBar],
    from: TimeFrame,
    to: TimeFrame,
    flags: u32,
) -> Result<Vec<MarketBar>> {
    let from_ms = from.duration_ms();
    let to_ms = to.duration_ms();
    if from_ms == 0 || to_ms == 0 || to_ms < from_ms || to_ms % from_ms != 0 {
        return Err(DataFeedError::InvalidConfig(format!(
            "cannot resample {:?} into {:?}",
            from, to
        )));
    }

    let mut out: Vec<MarketBar> = Vec::with_capacity(bars.len() / (to_ms / from_ms) as usize + 1);
    let mut window_count: u64 = 0;
    for bar in bars {
        let window_start = start_of_period_ms(to_ms, bar.time_ms);
        match out.last_mut() {
            Some(current) if current.time_ms == window_start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
                current.quote_volume += bar.quote_volume;
                current.buy_volume += bar.buy_volume;
                current.buy_quote_volume += bar.buy_quote_volume;
                current.tick_volume += bar.tick_volume;
                current.spread = aggregate_spread(current.spread, bar.spread, window_count, flags);
                window_count += 1;
            }
            _ => {
                let mut opened = *bar;
                opened.time_ms = window_start;
                out.push(opened);
                window_count = 1;
            }
        }
    }
    Ok(out)
}

/// In-place variant of [`resample_market_bars`].
pub fn resample_market_bars_in_place(
    bars: &mut Vec<MarketBar>,
    from: TimeFrame,
    to: TimeFrame,
    flags: u32,
) -> Result<()> {
    let resampled = resample_market_bars(bars, from, to, flags)?;
    *bars = resampled;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute_bars() -> Vec<MarketBar> {
        (0..10u64)
            .map(|i| MarketBar {
                time_ms: i * 60_000,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1.0,
                quote_volume: 100.0,
                buy_volume: 0.5,
                buy_quote_volume: 50.0,
                spread: i as u32,
                tick_volume: 10,
            })
            .collect()
    }

    #[test]
    fn test_m1_to_m5() {
        let bars = minute_bars();
        let resampled =
            resample_market_bars(&bars, TimeFrame::M1, TimeFrame::M5, 0).unwrap();
        assert_eq!(resampled.len(), 2);

        let first = &resampled[0];
        assert_eq!(first.time_ms, 0);
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 105.0);
        assert_eq!(first.low, 99.0);
        assert_eq!(first.close, 104.5);
        assert_eq!(first.volume, 5.0);
        assert_eq!(first.tick_volume, 50);
        // Default spread mode keeps the last value of the window.
        assert_eq!(first.spread, 4);
    }

    #[test]
    fn test_spread_max_mode() {
        let bars = minute_bars();
        let resampled = resample_market_bars(
            &bars,
            TimeFrame::M1,
            TimeFrame::M5,
            BarStorageFlags::SpreadMax as u32,
        )
        .unwrap();
        assert_eq!(resampled[0].spread, 4);
        assert_eq!(resampled[1].spread, 9);
    }

    #[test]
    fn test_incompatible_frames_rejected() {
        let bars = minute_bars();
        assert!(resample_market_bars(&bars, TimeFrame::M5, TimeFrame::M1, 0).is_err());
        assert!(resample_market_bars(&bars, TimeFrame::M1, TimeFrame::Unknown, 0).is_err());
    }

    #[test]
    fn test_in_place_variant() {
        let mut bars = minute_bars();
        resample_market_bars_in_place(&mut bars, TimeFrame::M1, TimeFrame::M5, 0).unwrap();
        assert_eq!(bars.len(), 2);
    }
}
