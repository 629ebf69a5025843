//! Bid/ask spread reconstruction over trade-only tick streams.
//!
//! Four interchangeable processors run as a single forward pass over one
//! hour of ticks. All of them maintain the one-second chunk index as a
//! byproduct; the dynamic and median models additionally carry spread
//! state across hour boundaries while data stays contiguous.

use crate::data::ticks::{
    BidAskModel, BidAskRestoreConfig, MarketTick, TickCodecConfig, TickUpdateFlags,
};
use crate::error::{DataFeedError, Result};
use crate::utils::math::{compare_with_precision, median3, normalize_price, pow10_f64};
use crate::utils::time::MS_PER_SEC;

/// Spread reconstruction processor, selected by [`BidAskModel`].
#[derive(Debug, Clone)]
pub enum SpreadProc {
    /// Leave bid/ask as stored; chunk index only.
    None,
    /// Fixed spread around the last price.
    Fixed,
    /// Most recently observed transition spread.
    Dynamic { prev_spread: f64 },
    /// Median filter over the last three observed spreads.
    Median { prev_spread: f64, prev2_spread: f64 },
}

impl SpreadProc {
    /// Builds the processor a config calls for.
    pub fn for_config(config: &BidAskRestoreConfig) -> Self {
        match config.mode {
            BidAskModel::None => SpreadProc::None,
            BidAskModel::FixedSpread => SpreadProc::Fixed,
            BidAskModel::DynamicSpread => SpreadProc::Dynamic { prev_spread: 0.0 },
            BidAskModel::MedianSpread => SpreadProc::Median {
                prev_spread: 0.0,
                prev2_spread: 0.0,
            },
        }
    }

    /// Processes one hour of ticks: restores bid/ask per the model,
    /// fills the chunk index, and rolls `prev_tick`/`has_prev_data`
    /// forward to the last tick.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        ticks: &mut [MarketTick],
        chunks: &mut [u32],
        prev_tick: &mut MarketTick,
        has_prev_data: &mut bool,
        codec_config: &TickCodecConfig,
        bidask_config: &BidAskRestoreConfig,
        start_time_ms: u64,
        _end_time_ms: u64,
    ) -> Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }
        let digits = if bidask_config.price_digits != 0 {
            bidask_config.price_digits
        } else {
            codec_config.price_digits
        };
        let seed = f64::from(bidask_config.fixed_spread) / pow10_f64(digits);

        if *has_prev_data && !compare_with_precision(ticks[0].last, prev_tick.last, digits) {
            ticks[0].set_flag(TickUpdateFlags::LastUpdated);
        }

        match self {
            SpreadProc::None => process_none(ticks, chunks, start_time_ms),
            SpreadProc::Fixed => process_fixed(ticks, chunks, start_time_ms, seed)?,
            SpreadProc::Dynamic { prev_spread } => process_dynamic(
                ticks,
                chunks,
                prev_tick,
                *has_prev_data,
                digits,
                seed,
                start_time_ms,
                prev_spread,
            )?,
            SpreadProc::Median {
                prev_spread,
                prev2_spread,
            } => process_median(
                ticks,
                chunks,
                prev_tick,
                *has_prev_data,
                digits,
                seed,
                start_time_ms,
                prev_spread,
                prev2_spread,
            )?,
        }

        *prev_tick = ticks[ticks.len() - 1];
        *has_prev_data = true;
        Ok(())
    }
}

/// One-second chunk boundary tracker.
struct ChunkCursor {
    fragment: usize,
    next_boundary_ms: u64,
}

impl ChunkCursor {
    fn new(chunks: &mut [u32], start_time_ms: u64) -> Self {
        chunks[0] = 0;
        Self {
            fragment: 1,
            next_boundary_ms: start_time_ms + MS_PER_SEC,
        }
    }

    #[inline]
    fn advance(&mut self, chunks: &mut [u32], tick_time_ms: u64, index: usize) {
        while self.fragment < chunks.len() && tick_time_ms >= self.next_boundary_ms {
            chunks[self.fragment] = index as u32;
            self.fragment += 1;
            self.next_boundary_ms += MS_PER_SEC;
        }
    }

    fn finish(self, chunks: &mut [u32], last_index: usize) {
        for entry in chunks.iter_mut().skip(self.fragment) {
            *entry = last_index as u32;
        }
    }
}

fn apply_side(tick: &mut MarketTick, spread: f64, index: usize) -> Result<()> {
    if tick.has_flag(TickUpdateFlags::TickFromBuy) {
        tick.ask = tick.last;
        tick.bid = tick.ask - spread;
    } else if tick.has_flag(TickUpdateFlags::TickFromSell) {
        tick.bid = tick.last;
        tick.ask = tick.bid + spread;
    } else {
        return Err(DataFeedError::InvalidTick(index));
    }
    if tick.has_flag(TickUpdateFlags::LastUpdated) {
        tick.set_flag(TickUpdateFlags::AskUpdated);
        tick.set_flag(TickUpdateFlags::BidUpdated);
    }
    Ok(())
}

/// Spread observed at a buy/sell transition: a buy print above the
/// previous sell print (or a sell print below the previous buy) exposes
/// the book's half-spread distance.
fn transition_spread(tick: &MarketTick, prev: &MarketTick, digits: u8) -> Option<f64> {
    if tick.has_flag(TickUpdateFlags::TickFromBuy)
        && prev.has_flag(TickUpdateFlags::TickFromSell)
        && tick.last > prev.last
    {
        Some(normalize_price(tick.last - prev.last, digits))
    } else if tick.has_flag(TickUpdateFlags::TickFromSell)
        && prev.has_flag(TickUpdateFlags::TickFromBuy)
        && tick.last < prev.last
    {
        Some(normalize_price(prev.last - tick.last, digits))
    } else {
        None
    }
}

fn process_none(ticks: &mut [MarketTick], chunks: &mut [u32], start_time_ms: u64) {
    let mut cursor = ChunkCursor::new(chunks, start_time_ms);
    for i in 0..ticks.len() {
        cursor.advance(chunks, ticks[i].time_ms, i);
    }
    cursor.finish(chunks, ticks.len() - 1);
}

fn process_fixed(
    ticks: &mut [MarketTick],
    chunks: &mut [u32],
    start_time_ms: u64,
    spread: f64,
) -> Result<()> {
    let mut cursor = ChunkCursor::new(chunks, start_time_ms);

    apply_side(&mut ticks[0], spread, 0)?;
    cursor.advance(chunks, ticks[0].time_ms, 0);

    for i in 1..ticks.len() {
        if ticks[i].has_flag(TickUpdateFlags::LastUpdated) {
            apply_side(&mut ticks[i], spread, i)?;
        } else {
            let (bid, ask) = (ticks[i - 1].bid, ticks[i - 1].ask);
            ticks[i].bid = bid;
            ticks[i].ask = ask;
        }
        cursor.advance(chunks, ticks[i].time_ms, i);
    }

    cursor.finish(chunks, ticks.len() - 1);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_dynamic(
    ticks: &mut [MarketTick],
    chunks: &mut [u32],
    prev_tick: &MarketTick,
    has_prev_data: bool,
    digits: u8,
    seed: f64,
    start_time_ms: u64,
    prev_spread: &mut f64,
) -> Result<()> {
    let mut cursor = ChunkCursor::new(chunks, start_time_ms);

    if !has_prev_data {
        *prev_spread = seed;
    }
    let mut applied = *prev_spread;

    if has_prev_data {
        if let Some(observed) = transition_spread(&ticks[0], prev_tick, digits) {
            applied = observed;
            *prev_spread = observed;
        }
    }
    apply_side(&mut ticks[0], applied, 0)?;
    cursor.advance(chunks, ticks[0].time_ms, 0);

    for i in 1..ticks.len() {
        if ticks[i].has_flag(TickUpdateFlags::LastUpdated) {
            if let Some(observed) = transition_spread(&ticks[i], &ticks[i - 1], digits) {
                applied = observed;
                *prev_spread = observed;
            }
            apply_side(&mut ticks[i], applied, i)?;
        } else {
            let (bid, ask) = (ticks[i - 1].bid, ticks[i - 1].ask);
            ticks[i].bid = bid;
            ticks[i].ask = ask;
        }
        cursor.advance(chunks, ticks[i].time_ms, i);
    }

    cursor.finish(chunks, ticks.len() - 1);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_median(
    ticks: &mut [MarketTick],
    chunks: &mut [u32],
    prev_tick: &MarketTick,
    has_prev_data: bool,
    digits: u8,
    seed: f64,
    start_time_ms: u64,
    prev_spread: &mut f64,
    prev2_spread: &mut f64,
) -> Result<()> {
    let mut cursor = ChunkCursor::new(chunks, start_time_ms);

    // Losing continuity reseeds the whole history to the fixed spread.
    let mut applied = if !has_prev_data {
        *prev_spread = seed;
        *prev2_spread = seed;
        seed
    } else {
        *prev_spread
    };

    if has_prev_data {
        if let Some(observed) = transition_spread(&ticks[0], prev_tick, digits) {
            applied = median3(*prev2_spread, *prev_spread, observed);
            *prev2_spread = *prev_spread;
            *prev_spread = observed;
        }
    }
    apply_side(&mut ticks[0], applied, 0)?;
    cursor.advance(chunks, ticks[0].time_ms, 0);

    for i in 1..ticks.len() {
        if ticks[i].has_flag(TickUpdateFlags::LastUpdated) {
            if let Some(observed) = transition_spread(&ticks[i], &ticks[i - 1], digits) {
                applied = median3(*prev2_spread, *prev_spread, observed);
                *prev2_spread = *prev_spread;
                *prev_spread = observed;
            }
            apply_side(&mut ticks[i], applied, i)?;
        } else {
            let (bid, ask) = (ticks[i - 1].bid, ticks[i - 1].ask);
            ticks[i].bid = bid;
            ticks[i].ask = ask;
        }
        cursor.advance(chunks, ticks[i].time_ms, i);
    }

    cursor.finish(chunks, ticks.len() - 1);
    Ok(())
}
