//! Combined columnar + entropy pipeline used by the storage layer.

use crate::codec::entropy::EntropyCodec;
use crate::codec::tick_codec::TickCodec;
use crate::data::ticks::{MarketTick, TickCodecConfig};
use crate::error::Result;

/// Long-lived tick compressor: columnar stage, then ZSTD with trained
/// dictionaries. Owns all scratch buffers so steady-state segment writes
/// do not allocate.
#[derive(Debug, Default)]
pub struct TickCompressor {
    codec: TickCodec,
    entropy: EntropyCodec,
    columnar: Vec<u8>,
}

impl TickCompressor {
    /// Creates a compressor with the compiled-in dictionary registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compressor over an explicit entropy codec.
    pub fn with_entropy(entropy: EntropyCodec) -> Self {
        Self {
            codec: TickCodec::new(),
            entropy,
            columnar: Vec::new(),
        }
    }

    /// Compresses one segment of ticks into a storage blob.
    pub fn compress(&mut self, ticks: &[MarketTick], config: &TickCodecConfig) -> Result<Vec<u8>> {
        self.codec.serialize(ticks, config, &mut self.columnar)?;
        self.entropy.compress(&self.columnar)
    }

    /// Decompresses a storage blob, appending ticks and overwriting the
    /// config with the stored one.
    pub fn decompress(
        &mut self,
        blob: &[u8],
        ticks: &mut Vec<MarketTick>,
        config: &mut TickCodecConfig,
    ) -> Result<()> {
        let columnar = self.entropy.decompress(blob)?;
        self.codec.deserialize(&columnar, ticks, config)
    }
}
