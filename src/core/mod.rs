//! Replay core: data source abstraction, streaming tick buffers with
//! bid/ask reconstruction, and the market data bus.
//!
//! The core is single-threaded cooperative: the caller drives progress by
//! invoking `MarketDataBus::update(time_ms)` with monotone simulation
//! times. All I/O is synchronous; a slow fetch is a stall, not a race.

pub mod buffer_pool;
pub mod bus;
pub mod source;
pub mod spread;
pub mod stream_buffer;

pub use buffer_pool::MarketDataBuffer;
pub use bus::{
    EventType, ListenerRef, MarketDataBus, MarketDataListener, MarketSnapshot, SubscriptionHandle,
    MAX_SUBSCRIBERS,
};
pub use source::{MarketDataSource, StoreDataSource};
pub use spread::SpreadProc;
pub use stream_buffer::{StreamTickBuffer, CHUNK_COUNT};
