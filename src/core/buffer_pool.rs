//! Pool of per-pair streaming buffers.

use crate::core::source::MarketDataSource;
use crate::core::stream_buffer::StreamTickBuffer;
use crate::data::ticks::{MarketTick, MarketTickSpan};
use crate::error::Result;

/// One [`StreamTickBuffer`] per (symbol, provider) pair, addressed by the
/// flat data index `provider * symbol_count + symbol`.
pub struct MarketDataBuffer {
    buffers: Vec<StreamTickBuffer>,
    symbol_count: usize,
    provider_count: usize,
}

impl MarketDataBuffer {
    /// Builds the pool for a source's universe, installing each pair's
    /// bid/ask reconstruction config.
    pub fn new(source: &dyn MarketDataSource) -> Self {
        let symbol_count = source.symbol_count();
        let provider_count = source.provider_count();
        let mut buffers = Vec::with_capacity(symbol_count * provider_count);
        for index in 0..symbol_count * provider_count {
            let mut buffer = StreamTickBuffer::new();
            buffer.set_bidask_config(source.bidask_config(index));
            buffers.push(buffer);
        }
        Self {
            buffers,
            symbol_count,
            provider_count,
        }
    }

    /// Number of symbols in the universe.
    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    /// Number of providers in the universe.
    pub fn provider_count(&self) -> usize {
        self.provider_count
    }

    /// Number of (symbol, provider) pairs.
    pub fn pair_count(&self) -> usize {
        self.buffers.len()
    }

    /// Flat data index of a (symbol, provider) pair.
    #[inline]
    pub fn data_index(&self, symbol_index: u32, provider_index: u32) -> usize {
        provider_index as usize * self.symbol_count + symbol_index as usize
    }

    /// Ensures the buffer at `index` holds the hour containing `time_ms`.
    pub fn fetch(
        &mut self,
        index: usize,
        time_ms: u64,
        source: &mut dyn MarketDataSource,
    ) -> Result<()> {
        self.buffers[index].fetch(index, time_ms, source)
    }

    /// Selects a span on the buffer at `index`.
    pub fn set_tick_span(&mut self, index: usize, start_ms: u64, end_ms: u64) {
        self.buffers[index].set_tick_span(start_ms, end_ms);
    }

    /// The selected span for a pair.
    pub fn tick_span(&self, symbol_index: u32, provider_index: u32) -> MarketTickSpan<'_> {
        self.buffers[self.data_index(symbol_index, provider_index)].tick_span()
    }

    /// Last tick of the selected span for a pair.
    pub fn latest_tick(&self, symbol_index: u32, provider_index: u32) -> Option<&MarketTick> {
        self.buffers[self.data_index(symbol_index, provider_index)].latest_tick()
    }

    /// Direct access to one buffer.
    pub fn buffer(&self, index: usize) -> &StreamTickBuffer {
        &self.buffers[index]
    }

    /// Mutable access to one buffer (real-time append path).
    pub fn buffer_mut(&mut self, index: usize) -> &mut StreamTickBuffer {
        &mut self.buffers[index]
    }
}
