//! Reusable scratch buffers for the columnar codec.

/// Auxiliary vectors shared by every column encoder and decoder.
///
/// The context is owned by a long-lived codec instance so the per-column
/// pipelines never allocate in steady state. Borrow the fields you need
/// by destructuring; the split borrows keep the compiler happy.
#[derive(Debug, Default)]
pub struct CodecContext {
    /// Scaled integer prices.
    pub scaled_i64: Vec<i64>,
    /// Zig-zag deltas, u32 path.
    pub deltas_u32: Vec<u32>,
    /// Zig-zag deltas or scaled values, u64 path.
    pub deltas_u64: Vec<u64>,
    /// Frequency dictionary, u32 path.
    pub values_u32: Vec<u32>,
    /// Frequency dictionary, u64 path.
    pub values_u64: Vec<u64>,
    /// Dictionary index permutation.
    pub index_map_u32: Vec<u32>,
    /// Dense frequency codes.
    pub codes_u32: Vec<u32>,
    /// Run-length token stream.
    pub repeats_u32: Vec<u32>,
}

impl CodecContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all buffered capacity.
    pub fn shrink(&mut self) {
        *self = Self::default();
    }
}
