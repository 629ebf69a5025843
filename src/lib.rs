//! DataFeedHub
//!
//! Storage and streaming engine for tick-granular crypto market data:
//! ingest raw exchange exports, normalize them into a compact columnar
//! binary form, persist them in an embedded ordered key-value store
//! keyed by (market, exchange, symbol, hour), and replay them against
//! subscribers driven by a simulated clock.
//!
//! # Architecture
//!
//! ```text
//! ingest (CSV/GZIP/ZIP parsers)
//!     │ TickSequence
//!     ▼
//! codec (columnar tick/bar codec ── ZSTD entropy stage)
//!     │ segment blobs
//!     ▼
//! storage (hour-segmented KV: ticks / bars / funding + metadata cache)
//!     │ MarketDataSource
//!     ▼
//! core (StreamTickBuffer + spread reconstruction ── MarketDataBus)
//!     │ MarketSnapshot
//!     ▼
//! listeners (strategies, recorders)
//! ```
//!
//! The replay core is single-threaded cooperative: callers drive it by
//! invoking `MarketDataBus::update(time_ms)` with monotone simulation
//! times. Storage transactions are single-writer/multi-reader under the
//! KV engine's MVCC.

pub mod codec;
pub mod core;
pub mod data;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod transform;
pub mod utils;

pub use crate::core::{
    MarketDataBus, MarketDataListener, MarketDataSource, MarketSnapshot, StoreDataSource,
};
pub use data::{
    BarCodecConfig, BidAskModel, BidAskRestoreConfig, MarketBar, MarketTick, TickCodecConfig,
    TickSequence, TimeFrame,
};
pub use error::{DataFeedError, Result};
pub use storage::{BarStore, FundingStore, StorageEnv, TickStore};
