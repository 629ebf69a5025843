//! Flat-filling of missing bars.
//!
//! Resampling assumes a gapless series; this is the upstream step that
//! makes it true. Missing intervals are filled with flat bars carrying
//! the previous close and zero volumes.

use crate::data::bars::{MarketBar, TimeFrame};
use crate::error::{DataFeedError, Result};

/// Returns a gapless copy of `bars` at the given timeframe.
///
/// Input must be strictly increasing and aligned to the timeframe.
pub fn fill_bar_gaps(bars: &[MarketBar], time_frame: TimeFrame) -> Result<Vec<MarketBar>> {
    let step = time_frame.duration_ms();
    if step == 0 {
        return Err(DataFeedError::InvalidConfig(
            "cannot gap-fill an unknown timeframe".into(),
        ));
    }
    if bars.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(bars.len());
    out.push(bars[0]);
    for (i, bar) in bars.iter().enumerate().skip(1) {
        let prev = *out.last().expect("output is never empty here");
        if bar.time_ms <= prev.time_ms {
            return Err(DataFeedError::OutOfOrder(i));
        }
        let mut next_time = prev.time_ms + step;
        while next_time < bar.time_ms {
            out.push(flat_bar(&prev, next_time));
            next_time += step;
        }
        out.push(*bar);
    }
    Ok(out)
}

fn flat_bar(prev: &MarketBar, time_ms: u64) -> MarketBar {
    MarketBar {
        time_ms,
        open: prev.close,
        high: prev.close,
        low: prev.close,
        close: prev.close,
        volume: 0.0,
        quote_volume: 0.0,
        buy_volume: 0.0,
        buy_quote_volume: 0.0,
        spread: prev.spread,
        tick_volume: 0,
    }
}
