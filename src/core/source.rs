//! Market data source abstraction for the replay layer.

use crate::data::ticks::{BidAskRestoreConfig, MarketTick, TickCodecConfig};
use crate::error::Result;
use crate::storage::TickStore;

/// Historical tick supplier for the buffer pool.
///
/// A (symbol, provider) pair is addressed by its flat data index
/// `provider_index * symbol_count + symbol_index`. Implementations may
/// decompress on demand; a missing range is an empty read, not an error.
pub trait MarketDataSource {
    /// Number of symbols across all feeds.
    fn symbol_count(&self) -> usize;

    /// Number of data providers. Spot and futures on the same venue are
    /// distinct providers.
    fn provider_count(&self) -> usize;

    /// Bid/ask reconstruction config for a data index.
    fn bidask_config(&self, index: usize) -> BidAskRestoreConfig;

    /// Fetches ticks in `[start_ms, end_ms)` for a data index into
    /// `ticks` (cleared first), overwriting `config` with the stored
    /// codec configuration. Returns whether any ticks were found.
    fn fetch_ticks(
        &mut self,
        index: usize,
        start_ms: u64,
        end_ms: u64,
        ticks: &mut Vec<MarketTick>,
        config: &mut TickCodecConfig,
    ) -> Result<bool>;
}

/// Storage-backed data source: a symbol/provider universe over a
/// [`TickStore`].
pub struct StoreDataSource {
    store: TickStore,
    symbols: Vec<String>,
    providers: Vec<String>,
    bidask: Vec<BidAskRestoreConfig>,
}

impl StoreDataSource {
    /// Builds a source over `store` for the given universe. Every
    /// (symbol, provider) pair starts with a default (pass-through)
    /// bid/ask config.
    pub fn new(store: TickStore, symbols: Vec<String>, providers: Vec<String>) -> Self {
        let pair_count = symbols.len() * providers.len();
        Self {
            store,
            symbols,
            providers,
            bidask: vec![BidAskRestoreConfig::default(); pair_count],
        }
    }

    /// Sets the bid/ask reconstruction config for one pair.
    pub fn set_bidask_config(
        &mut self,
        symbol_index: u16,
        provider_index: u16,
        config: BidAskRestoreConfig,
    ) {
        let index = self.data_index(symbol_index, provider_index);
        self.bidask[index] = config;
    }

    /// Resolves a symbol name to its index.
    pub fn symbol_index(&self, name: &str) -> Option<u16> {
        self.symbols.iter().position(|s| s == name).map(|i| i as u16)
    }

    /// Resolves a provider name to its index.
    pub fn provider_index(&self, name: &str) -> Option<u16> {
        self.providers.iter().position(|p| p == name).map(|i| i as u16)
    }

    /// Flat data index of a (symbol, provider) pair.
    #[inline]
    pub fn data_index(&self, symbol_index: u16, provider_index: u16) -> usize {
        usize::from(provider_index) * self.symbols.len() + usize::from(symbol_index)
    }

    /// Access to the underlying store.
    pub fn store(&self) -> &TickStore {
        &self.store
    }

    fn split_index(&self, index: usize) -> (u16, u16) {
        let symbol = (index % self.symbols.len()) as u16;
        let provider = (index / self.symbols.len()) as u16;
        (symbol, provider)
    }
}

impl MarketDataSource for StoreDataSource {
    fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    fn provider_count(&self) -> usize {
        self.providers.len()
    }

    fn bidask_config(&self, index: usize) -> BidAskRestoreConfig {
        self.bidask.get(index).copied().unwrap_or_default()
    }

    fn fetch_ticks(
        &mut self,
        index: usize,
        start_ms: u64,
        end_ms: u64,
        ticks: &mut Vec<MarketTick>,
        config: &mut TickCodecConfig,
    ) -> Result<bool> {
        let (symbol, provider) = self.split_index(index);
        self.store
            .fetch(symbol, provider, start_ms, end_ms, ticks, config)
    }
}
