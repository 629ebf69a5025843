//! One-hour streaming tick buffer with bid/ask reconstruction.
//!
//! A buffer owns at most one hour of ticks for one (symbol, provider)
//! pair. Loads keep running spread state when the new hour directly
//! follows the held one; any other jump primes the state by processing
//! the previous hour first. A 3601-entry per-second chunk index makes
//! sub-hour span queries O(1) plus a short linear refinement.

use crate::core::source::MarketDataSource;
use crate::core::spread::SpreadProc;
use crate::data::ticks::{
    BidAskRestoreConfig, MarketTick, MarketTickSpan, TickCodecConfig, TickUpdateFlags,
};
use crate::error::{DataFeedError, Result};
use crate::utils::math::compare_with_precision;
use crate::utils::time::{ms_to_sec, start_of_hour_ms, MS_PER_HOUR, MS_PER_SEC, SEC_PER_HOUR};

/// Number of chunk index entries: one per second plus a sentinel.
pub const CHUNK_COUNT: usize = SEC_PER_HOUR as usize + 1;

/// Streaming buffer for one (symbol, provider) pair.
pub struct StreamTickBuffer {
    ticks: Vec<MarketTick>,
    chunks: Vec<u32>,
    prev_tick: MarketTick,
    has_prev_data: bool,
    loaded: bool,
    codec_config: TickCodecConfig,
    bidask_config: BidAskRestoreConfig,
    spread: SpreadProc,
    start_time_ms: u64,
    end_time_ms: u64,
    span_start: usize,
    span_len: usize,
}

impl Default for StreamTickBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTickBuffer {
    /// Creates an empty buffer with a pass-through spread model.
    pub fn new() -> Self {
        Self {
            ticks: Vec::new(),
            chunks: vec![0; CHUNK_COUNT],
            prev_tick: MarketTick::default(),
            has_prev_data: false,
            loaded: false,
            codec_config: TickCodecConfig::default(),
            bidask_config: BidAskRestoreConfig::default(),
            spread: SpreadProc::None,
            start_time_ms: 0,
            end_time_ms: 0,
            span_start: 0,
            span_len: 0,
        }
    }

    /// Installs the bid/ask reconstruction config and resets spread
    /// state.
    pub fn set_bidask_config(&mut self, config: BidAskRestoreConfig) {
        self.bidask_config = config;
        self.spread = SpreadProc::for_config(&config);
        self.has_prev_data = false;
    }

    /// Current bid/ask reconstruction config.
    pub fn bidask_config(&self) -> &BidAskRestoreConfig {
        &self.bidask_config
    }

    /// Codec config of the last loaded segment.
    pub fn codec_config(&self) -> &TickCodecConfig {
        &self.codec_config
    }

    /// Number of ticks held.
    pub fn tick_count(&self) -> usize {
        self.ticks.len()
    }

    /// The currently selected span. Empty until `set_tick_span` selects
    /// a non-empty range; invalidated by `fetch` and `append_ticks`.
    pub fn tick_span(&self) -> MarketTickSpan<'_> {
        &self.ticks[self.span_start..self.span_start + self.span_len]
    }

    /// Last tick of the current span.
    pub fn latest_tick(&self) -> Option<&MarketTick> {
        self.tick_span().last()
    }

    /// Loads the hour containing `time_ms`.
    ///
    /// A load of the directly following hour keeps running spread state;
    /// any other jump clears `has_prev_data` and primes it by processing
    /// the previous hour before the target hour.
    pub fn fetch(
        &mut self,
        index: usize,
        time_ms: u64,
        source: &mut dyn MarketDataSource,
    ) -> Result<()> {
        self.invalidate_span();
        if self.loaded && time_ms >= self.start_time_ms && time_ms < self.end_time_ms {
            return Ok(());
        }

        let hour_start = start_of_hour_ms(time_ms);
        if self.loaded && self.has_prev_data && hour_start == self.end_time_ms {
            self.load_hour(index, hour_start, source)?;
        } else {
            self.reload(index, hour_start, source)?;
        }

        self.start_time_ms = hour_start;
        self.end_time_ms = hour_start + MS_PER_HOUR;
        self.loaded = true;

        if self.ticks.is_empty() {
            self.chunks.iter_mut().for_each(|c| *c = 0);
            self.has_prev_data = false;
            return Ok(());
        }

        self.spread.process(
            &mut self.ticks,
            &mut self.chunks,
            &mut self.prev_tick,
            &mut self.has_prev_data,
            &self.codec_config,
            &self.bidask_config,
            hour_start,
            hour_start + MS_PER_HOUR,
        )
    }

    /// Selects the ticks intersecting `[start_ms, end_ms)`.
    pub fn set_tick_span(&mut self, start_ms: u64, end_ms: u64) {
        self.invalidate_span();
        if self.ticks.is_empty() || end_ms <= start_ms {
            return;
        }

        let rel_start = start_ms.saturating_sub(self.start_time_ms);
        let rel_end = end_ms
            .saturating_sub(self.start_time_ms)
            .saturating_add(MS_PER_SEC - 1);
        let s_idx = (ms_to_sec(rel_start) as usize).min(SEC_PER_HOUR as usize);
        let e_idx = (ms_to_sec(rel_end) as usize).min(SEC_PER_HOUR as usize);

        let start_pos = self.chunks[s_idx] as usize;
        let end_pos = (self.chunks[e_idx] as usize).min(self.ticks.len() - 1);

        let mut first = None;
        for i in start_pos..=end_pos {
            if self.ticks[i].time_ms >= start_ms {
                first = Some(i);
                break;
            }
        }
        let Some(first) = first else { return };

        for i in (first..=end_pos).rev() {
            if self.ticks[i].time_ms < end_ms {
                self.span_start = first;
                self.span_len = i - first + 1;
                return;
            }
        }
    }

    /// Streams real-time ticks in.
    ///
    /// Fails with `OutOfOrder` on non-increasing timestamps. Crossing an
    /// hour boundary flushes the filled hour through `db_writer` before
    /// continuing in a fresh buffer.
    pub fn append_ticks(
        &mut self,
        new_ticks: &[MarketTick],
        db_writer: &mut dyn FnMut(&[MarketTick]) -> Result<()>,
        calc_last_updated: bool,
    ) -> Result<()> {
        if new_ticks.is_empty() {
            return Ok(());
        }
        self.invalidate_span();

        for (i, tick) in new_ticks.iter().enumerate() {
            let mut tick = *tick;
            if let Some(last) = self.ticks.last() {
                if tick.time_ms <= last.time_ms {
                    return Err(DataFeedError::OutOfOrder(i));
                }
                if calc_last_updated
                    && !compare_with_precision(tick.last, last.last, self.codec_config.price_digits)
                {
                    tick.set_flag(TickUpdateFlags::LastUpdated);
                }
            }

            if self.ticks.is_empty() {
                self.start_time_ms = start_of_hour_ms(tick.time_ms);
                self.end_time_ms = self.start_time_ms + MS_PER_HOUR;
            } else if tick.time_ms >= self.start_time_ms + MS_PER_HOUR {
                db_writer(&self.ticks)?;
                self.ticks.clear();
                self.start_time_ms = start_of_hour_ms(tick.time_ms);
                self.end_time_ms = self.start_time_ms + MS_PER_HOUR;
            }
            self.ticks.push(tick);
        }
        self.loaded = true;

        self.spread.process(
            &mut self.ticks,
            &mut self.chunks,
            &mut self.prev_tick,
            &mut self.has_prev_data,
            &self.codec_config,
            &self.bidask_config,
            self.start_time_ms,
            self.end_time_ms,
        )
    }

    fn invalidate_span(&mut self) {
        self.span_start = 0;
        self.span_len = 0;
    }

    fn load_hour(
        &mut self,
        index: usize,
        hour_start: u64,
        source: &mut dyn MarketDataSource,
    ) -> Result<()> {
        self.ticks.clear();
        source.fetch_ticks(
            index,
            hour_start,
            hour_start + MS_PER_HOUR,
            &mut self.ticks,
            &mut self.codec_config,
        )?;
        Ok(())
    }

    fn reload(
        &mut self,
        index: usize,
        hour_start: u64,
        source: &mut dyn MarketDataSource,
    ) -> Result<()> {
        self.has_prev_data = false;
        if hour_start >= MS_PER_HOUR {
            let prev_start = hour_start - MS_PER_HOUR;
            self.load_hour(index, prev_start, source)?;
            if !self.ticks.is_empty() {
                self.spread.process(
                    &mut self.ticks,
                    &mut self.chunks,
                    &mut self.prev_tick,
                    &mut self.has_prev_data,
                    &self.codec_config,
                    &self.bidask_config,
                    prev_start,
                    prev_start + MS_PER_HOUR,
                )?;
            }
        }
        self.load_hour(index, hour_start, source)
    }
}
