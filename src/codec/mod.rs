//! Lossless columnar codec for tick and bar data.
//!
//! The encode pipeline per column: scale to integers → delta + zig-zag →
//! frequency substitution → run-length → dictionary sorted-delta /
//! index-permutation packing → block bit-packing or varint. A ZSTD
//! entropy stage with size-bucketed trained dictionaries sits behind the
//! columnar stage on the storage path.

pub mod bar_codec;
pub mod bitpack;
pub mod compressor;
pub mod context;
pub mod delta;
pub mod dict_trainer;
pub mod entropy;
pub mod frequency;
pub mod repeats;
pub mod tick_codec;
mod tick_decoder;
mod tick_encoder;
pub mod vbyte;
pub mod zigzag;

pub use bar_codec::{deserialize_bars, is_valid_bar_signature, serialize_bars};
pub use compressor::TickCompressor;
pub use context::CodecContext;
pub use entropy::{DictBucket, DictionaryRegistry, EntropyCodec};
pub use tick_codec::{is_valid_signature, TickCodec, TickSerializer};
