//! ZSTD dictionary training over columnar sample corpora.
//!
//! Training runs offline over hour-segment blobs produced by the columnar
//! codec. Samples are bucketed by size, the corpus is capped at 4 GiB by
//! pruning middle samples (keeping the head and tail of the collection),
//! and dictionaries are trained across a ladder of target sizes so the
//! best ratio/size trade-off can be picked per deployment.

use tracing::info;

use crate::codec::entropy::{DictBucket, DictionaryRegistry};
use crate::error::Result;

/// Training corpus cap in bytes.
pub const CORPUS_CAP_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Target dictionary sizes in bytes.
pub const DICTIONARY_SIZE_LADDER: [usize; 18] = [
    10 * 1024,
    25 * 1024,
    50 * 1024,
    75 * 1024,
    100 * 1024,
    125 * 1024,
    150 * 1024,
    200 * 1024,
    250 * 1024,
    300 * 1024,
    400 * 1024,
    500 * 1024,
    750 * 1024,
    1000 * 1024,
    1500 * 1024,
    2000 * 1024,
    5000 * 1024,
    10000 * 1024,
];

/// Partitions samples into the three size buckets.
pub fn split_samples_by_size(samples: &[Vec<u8>]) -> (Vec<&[u8]>, Vec<&[u8]>, Vec<&[u8]>) {
    use crate::codec::entropy::{LARGE_BLOB_THRESHOLD, SMALL_BLOB_THRESHOLD};
    let mut small = Vec::new();
    let mut medium = Vec::new();
    let mut large = Vec::new();
    for sample in samples {
        if sample.len() < SMALL_BLOB_THRESHOLD {
            small.push(sample.as_slice());
        } else if sample.len() < LARGE_BLOB_THRESHOLD {
            medium.push(sample.as_slice());
        } else {
            large.push(sample.as_slice());
        }
    }
    (small, medium, large)
}

/// Caps the total corpus size by dropping middle samples until the
/// remainder fits. The head and tail of the collection survive, which
/// keeps both old and recent market regimes represented.
pub fn trim_to_corpus_cap(samples: &mut Vec<&[u8]>, cap_bytes: u64) {
    let mut total: u64 = samples.iter().map(|s| s.len() as u64).sum();
    while total > cap_bytes && !samples.is_empty() {
        let middle = samples.len() / 2;
        total -= samples[middle].len() as u64;
        samples.remove(middle);
    }
}

/// Trains a single dictionary of at most `max_size` bytes.
pub fn train_dictionary(samples: &[&[u8]], max_size: usize) -> Result<Vec<u8>> {
    Ok(zstd::dict::from_samples(samples, max_size)?)
}

/// Trains dictionaries for every non-empty bucket plus the all-sizes
/// fallback, returning a registry ready for [`EntropyCodec`].
///
/// [`EntropyCodec`]: crate::codec::entropy::EntropyCodec
pub fn train_bucketed_registry(samples: &[Vec<u8>], dict_size: usize) -> Result<DictionaryRegistry> {
    let (mut small, mut medium, mut large) = split_samples_by_size(samples);
    trim_to_corpus_cap(&mut small, CORPUS_CAP_BYTES);
    trim_to_corpus_cap(&mut medium, CORPUS_CAP_BYTES);
    trim_to_corpus_cap(&mut large, CORPUS_CAP_BYTES);

    let mut all: Vec<&[u8]> = samples.iter().map(|s| s.as_slice()).collect();
    trim_to_corpus_cap(&mut all, CORPUS_CAP_BYTES);

    let mut registry = DictionaryRegistry::new();
    for (bucket, bucket_samples) in [
        (DictBucket::Small, &small),
        (DictBucket::Medium, &medium),
        (DictBucket::Large, &large),
        (DictBucket::One, &all),
    ] {
        if bucket_samples.is_empty() {
            continue;
        }
        match train_dictionary(bucket_samples, dict_size) {
            Ok(dictionary) => {
                info!(
                    bucket = ?bucket,
                    samples = bucket_samples.len(),
                    dict_bytes = dictionary.len(),
                    "trained entropy dictionary"
                );
                registry.install(bucket, dictionary);
            }
            Err(err) => {
                // Sparse buckets routinely fail to train; the bucket then
                // falls back to the all-sizes dictionary at compress time.
                info!(bucket = ?bucket, error = %err, "dictionary training skipped");
            }
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_size() {
        let samples = vec![
            vec![0u8; 100],
            vec![0u8; 64 * 1024],
            vec![0u8; 3 * 1024 * 1024],
        ];
        let (small, medium, large) = split_samples_by_size(&samples);
        assert_eq!(small.len(), 1);
        assert_eq!(medium.len(), 1);
        assert_eq!(large.len(), 1);
    }

    #[test]
    fn test_trim_drops_middle_first() {
        let a = vec![1u8; 100];
        let b = vec![2u8; 100];
        let c = vec![3u8; 100];
        let d = vec![4u8; 100];
        let e = vec![5u8; 100];
        let mut samples: Vec<&[u8]> = vec![&a, &b, &c, &d, &e];
        trim_to_corpus_cap(&mut samples, 300);
        assert_eq!(samples.len(), 3);
        // Head and tail survive.
        assert_eq!(samples.first().unwrap()[0], 1);
        assert_eq!(samples.last().unwrap()[0], 5);
    }

    #[test]
    fn test_size_ladder_is_ascending() {
        assert!(DICTIONARY_SIZE_LADDER.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(DICTIONARY_SIZE_LADDER[0], 10 * 1024);
        assert_eq!(DICTIONARY_SIZE_LADDER[17], 10000 * 1024);
    }
}
