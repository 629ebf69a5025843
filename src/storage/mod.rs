//! Segmented storage over the embedded ordered KV engine.
//!
//! Each entity kind gets a segment sub-database (u64 keys) and a
//! metadata sub-database (u32 keys, fixed 64-byte records). Writes run
//! under a single writer transaction per batch; reads under snapshot
//! isolation.

pub mod bar_store;
pub mod env;
pub mod funding_store;
pub mod keys;
pub mod tick_store;

pub use bar_store::BarStore;
pub use env::StorageEnv;
pub use funding_store::FundingStore;
pub use tick_store::TickStore;
