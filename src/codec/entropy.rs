//! Entropy stage: ZSTD with size-bucketed trained dictionaries.
//!
//! Post-columnar blobs pass through ZSTD before hitting storage. The
//! dictionary is chosen by blob size bucket and its id is written as the
//! first byte of the output, so decoding is dictionary-self-identifying:
//!
//! | id | dictionary |
//! |----|------------|
//! | 0  | none       |
//! | 1  | small (< 64 KiB blobs) |
//! | 2  | medium (< 2 MiB blobs) |
//! | 3  | large (>= 2 MiB blobs) |
//! | 4  | all-sizes fallback     |

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::error::{DataFeedError, Result};

/// Default ZSTD compression level for segment blobs.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Blobs below this size use the `small` dictionary.
pub const SMALL_BLOB_THRESHOLD: usize = 64 * 1024;
/// Blobs below this size (and at least the small threshold) use `medium`.
pub const LARGE_BLOB_THRESHOLD: usize = 2 * 1024 * 1024;

/// Dictionary id byte for dictionary-less frames.
pub const DICT_ID_NONE: u8 = 0;

/// Size bucket selecting the trained dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DictBucket {
    /// Blobs under 64 KiB.
    Small = 1,
    /// Blobs under 2 MiB.
    Medium = 2,
    /// Blobs of 2 MiB and above.
    Large = 3,
    /// All-sizes fallback dictionary.
    One = 4,
}

impl DictBucket {
    /// Bucket for a blob of `len` bytes.
    #[inline]
    pub fn for_size(len: usize) -> Self {
        if len < SMALL_BLOB_THRESHOLD {
            DictBucket::Small
        } else if len < LARGE_BLOB_THRESHOLD {
            DictBucket::Medium
        } else {
            DictBucket::Large
        }
    }

    /// The id byte written to the entropy-layer output.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Reverses [`DictBucket::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(DictBucket::Small),
            2 => Some(DictBucket::Medium),
            3 => Some(DictBucket::Large),
            4 => Some(DictBucket::One),
            _ => None,
        }
    }
}

/// Holder for the per-bucket dictionaries.
#[derive(Debug, Clone, Default)]
pub struct DictionaryRegistry {
    small: Option<Arc<Vec<u8>>>,
    medium: Option<Arc<Vec<u8>>>,
    large: Option<Arc<Vec<u8>>>,
    one: Option<Arc<Vec<u8>>>,
}

impl DictionaryRegistry {
    /// Creates an empty registry: every bucket falls back to
    /// dictionary-less compression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a dictionary for a bucket.
    pub fn install(&mut self, bucket: DictBucket, dictionary: Vec<u8>) {
        let slot = self.slot_mut(bucket);
        *slot = Some(Arc::new(dictionary));
    }

    /// Looks up a bucket's dictionary.
    pub fn get(&self, bucket: DictBucket) -> Option<&[u8]> {
        self.slot(bucket).as_ref().map(|d| d.as_slice())
    }

    /// True when no bucket has a dictionary.
    pub fn is_empty(&self) -> bool {
        self.small.is_none() && self.medium.is_none() && self.large.is_none() && self.one.is_none()
    }

    fn slot(&self, bucket: DictBucket) -> &Option<Arc<Vec<u8>>> {
        match bucket {
            DictBucket::Small => &self.small,
            DictBucket::Medium => &self.medium,
            DictBucket::Large => &self.large,
            DictBucket::One => &self.one,
        }
    }

    fn slot_mut(&mut self, bucket: DictBucket) -> &mut Option<Arc<Vec<u8>>> {
        match bucket {
            DictBucket::Small => &mut self.small,
            DictBucket::Medium => &mut self.medium,
            DictBucket::Large => &mut self.large,
            DictBucket::One => &mut self.one,
        }
    }
}

lazy_static! {
    /// Compiled-in dictionaries, initialized on first use.
    ///
    /// The stock build links none, so encoders fall back to id 0 and
    /// decoders reject ids 1..=4 with `DictionaryMissing`. Deployments
    /// that ship trained dictionaries populate this registry instead of
    /// rebuilding it per session.
    pub static ref BUILTIN_DICTIONARIES: DictionaryRegistry = DictionaryRegistry::default();
}

/// ZSTD wrapper applying the bucket/dictionary policy.
#[derive(Debug, Clone)]
pub struct EntropyCodec {
    level: i32,
    registry: DictionaryRegistry,
}

impl Default for EntropyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl EntropyCodec {
    /// Creates a codec with the compiled-in dictionary registry.
    pub fn new(level: i32) -> Self {
        Self {
            level,
            registry: BUILTIN_DICTIONARIES.clone(),
        }
    }

    /// Creates a codec over an explicit registry.
    pub fn with_registry(level: i32, registry: DictionaryRegistry) -> Self {
        Self { level, registry }
    }

    /// Compresses a blob, prepending the dictionary id byte.
    ///
    /// The blob's size bucket is tried first, then the all-sizes
    /// dictionary, then dictionary-less compression.
    pub fn compress(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let bucket = DictBucket::for_size(blob.len());
        let (id, dictionary) = match self.registry.get(bucket) {
            Some(dict) => (bucket.id(), Some(dict)),
            None => match self.registry.get(DictBucket::One) {
                Some(dict) => (DictBucket::One.id(), Some(dict)),
                None => (DICT_ID_NONE, None),
            },
        };

        let mut out = vec![id];
        let mut encoder = match dictionary {
            Some(dict) => zstd::stream::write::Encoder::with_dictionary(&mut out, self.level, dict)?,
            None => zstd::stream::write::Encoder::new(&mut out, self.level)?,
        };
        encoder.write_all(blob)?;
        encoder.finish()?;
        Ok(out)
    }

    /// Decompresses an entropy-layer output back into the columnar blob.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (&id, frame) = data.split_first().ok_or(DataFeedError::Truncated(0))?;
        let dictionary = if id == DICT_ID_NONE {
            None
        } else {
            let bucket = DictBucket::from_id(id).ok_or(DataFeedError::BadSignature(id))?;
            Some(
                self.registry
                    .get(bucket)
                    .ok_or(DataFeedError::DictionaryMissing(id))?,
            )
        };

        let mut out = Vec::new();
        match dictionary {
            Some(dict) => {
                let mut decoder =
                    zstd::stream::read::Decoder::with_dictionary(Cursor::new(frame), dict)?;
                decoder.read_to_end(&mut out)?;
            }
            None => {
                let mut decoder = zstd::stream::read::Decoder::new(Cursor::new(frame))?;
                decoder.read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::dict_trainer::train_dictionary;

    fn structured_samples(count: usize) -> Vec<Vec<u8>> {
        let phrases: [&[u8]; 4] = [
            b"tick:last=10000.01;vol=0.500;",
            b"tick:last=10000.02;vol=0.750;",
            b"side=buy;flags=0x14;",
            b"side=sell;flags=0x24;",
        ];
        (0..count)
            .map(|i| {
                let mut sample = Vec::with_capacity(1024);
                let mut k = i;
                while sample.len() < 1000 {
                    sample.extend_from_slice(phrases[k % phrases.len()]);
                    sample.extend_from_slice(format!("seq={};", k * 7919).as_bytes());
                    k += 1;
                }
                sample
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_without_dictionaries() {
        let codec = EntropyCodec::with_registry(3, DictionaryRegistry::new());
        let blob: Vec<u8> = (0..10_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();

        let compressed = codec.compress(&blob).unwrap();
        assert_eq!(compressed[0], DICT_ID_NONE);
        assert!(compressed.len() < blob.len());

        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(blob, decompressed);
    }

    #[test]
    fn test_roundtrip_with_trained_dictionary() {
        let samples = structured_samples(512);
        let refs: Vec<&[u8]> = samples.iter().map(|s| s.as_slice()).collect();
        let dictionary = train_dictionary(&refs, 8 * 1024).unwrap();

        let mut registry = DictionaryRegistry::new();
        registry.install(DictBucket::Small, dictionary);
        let codec = EntropyCodec::with_registry(3, registry);

        let blob = samples[0].clone();
        let compressed = codec.compress(&blob).unwrap();
        assert_eq!(compressed[0], DictBucket::Small.id());

        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(blob, decompressed);
    }

    #[test]
    fn test_one_bucket_fallback() {
        let samples = structured_samples(512);
        let refs: Vec<&[u8]> = samples.iter().map(|s| s.as_slice()).collect();
        let dictionary = train_dictionary(&refs, 8 * 1024).unwrap();

        let mut registry = DictionaryRegistry::new();
        registry.install(DictBucket::One, dictionary);
        let codec = EntropyCodec::with_registry(3, registry);

        let compressed = codec.compress(&samples[1]).unwrap();
        assert_eq!(compressed[0], DictBucket::One.id());
        assert_eq!(codec.decompress(&compressed).unwrap(), samples[1]);
    }

    #[test]
    fn test_missing_dictionary_detected() {
        let samples = structured_samples(512);
        let refs: Vec<&[u8]> = samples.iter().map(|s| s.as_slice()).collect();
        let dictionary = train_dictionary(&refs, 8 * 1024).unwrap();

        let mut registry = DictionaryRegistry::new();
        registry.install(DictBucket::Small, dictionary);
        let writer = EntropyCodec::with_registry(3, registry);
        let compressed = writer.compress(&samples[0]).unwrap();

        let reader = EntropyCodec::with_registry(3, DictionaryRegistry::new());
        assert!(matches!(
            reader.decompress(&compressed),
            Err(DataFeedError::DictionaryMissing(1))
        ));
    }

    #[test]
    fn test_bucket_selection() {
        assert_eq!(DictBucket::for_size(1024), DictBucket::Small);
        assert_eq!(DictBucket::for_size(64 * 1024), DictBucket::Medium);
        assert_eq!(DictBucket::for_size(2 * 1024 * 1024), DictBucket::Large);
        assert_eq!(DictBucket::from_id(9), None);
    }

    #[test]
    fn test_empty_input_rejected() {
        let codec = EntropyCodec::default();
        assert!(matches!(
            codec.decompress(&[]),
            Err(DataFeedError::Truncated(0))
        ));
    }
}
