//! Library error types.
//!
//! The codec, storage, and buffer layers propagate these to the caller
//! without logging. The market data bus is the only component that
//! swallows errors (listener failures are logged and dispatch continues).

use thiserror::Error;

/// Errors surfaced by the codec, storage, and replay layers.
#[derive(Debug, Error)]
pub enum DataFeedError {
    /// Codec configuration is unusable: precision out of range, mutually
    /// exclusive flags both set, or a serializer asked to produce a format
    /// it does not own.
    #[error("invalid codec config: {0}")]
    InvalidConfig(String),

    /// First byte of an encoded blob does not match any known codec
    /// version.
    #[error("unknown format signature {0:#04x}")]
    BadSignature(u8),

    /// Decoder ran past the end of the input buffer.
    #[error("truncated input at offset {0}")]
    Truncated(usize),

    /// Decoded count or dictionary size exceeds sanity limits.
    #[error("decoded size exceeds sanity bounds: {0}")]
    Overflow(String),

    /// A batch of ticks or bars is not time-monotone.
    #[error("input is not time-ordered at index {0}")]
    OutOfOrder(usize),

    /// Bid/ask reconstruction met a tick with neither buy nor sell flag.
    #[error("tick {0} carries neither TICK_FROM_BUY nor TICK_FROM_SELL")]
    InvalidTick(usize),

    /// A store operation ran before `start()`.
    #[error("storage not initialized; call start() first")]
    StorageNotInitialized,

    /// Underlying KV engine error, passed through.
    #[error("transaction failed: {0}")]
    Transaction(#[from] heed::Error),

    /// The entropy layer was asked for a bucket whose compiled-in
    /// dictionary was not linked.
    #[error("no dictionary linked for entropy bucket id {0}")]
    DictionaryMissing(u8),

    /// I/O failure from the entropy stage or the filesystem.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed exchange export during ingest.
    #[error("ingest parse error: {0}")]
    Parse(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DataFeedError>;
