//! Frequency substitution coding.
//!
//! Maps each distinct input value to a dense code ordered by descending
//! frequency (ties broken by ascending value), so the hottest values get
//! the smallest codes. The encoder emits the value dictionary sorted by
//! value (friendly to sorted-delta coding) together with an index
//! permutation that recovers the frequency order; the decoder rebuilds the
//! inverse table from those two arrays.

use std::collections::HashMap;

use crate::error::{DataFeedError, Result};

/// Encodes a `u32` stream.
///
/// `codes` receives one dense code per input value; `values_sorted` the
/// distinct values in ascending order; `index_map[j]` the code assigned to
/// `values_sorted[j]`.
pub fn encode_frequency_u32(
    input: &[u32],
    codes: &mut Vec<u32>,
    values_sorted: &mut Vec<u32>,
    index_map: &mut Vec<u32>,
) {
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for &v in input {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut by_freq: Vec<(u32, u32)> = counts.into_iter().collect();
    by_freq.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut code_of: HashMap<u32, u32> = HashMap::with_capacity(by_freq.len());
    for (code, &(value, _)) in by_freq.iter().enumerate() {
        code_of.insert(value, code as u32);
    }

    codes.clear();
    codes.reserve(input.len());
    for &v in input {
        codes.push(code_of[&v]);
    }

    values_sorted.clear();
    values_sorted.extend(by_freq.iter().map(|&(v, _)| v));
    values_sorted.sort_unstable();

    index_map.clear();
    index_map.reserve(values_sorted.len());
    for &v in values_sorted.iter() {
        index_map.push(code_of[&v]);
    }
}

/// Encodes a `u64` stream. Codes stay `u32`; only the dictionary widens.
pub fn encode_frequency_u64(
    input: &[u64],
    codes: &mut Vec<u32>,
    values_sorted: &mut Vec<u64>,
    index_map: &mut Vec<u32>,
) {
    let mut counts: HashMap<u64, u32> = HashMap::new();
    for &v in input {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut by_freq: Vec<(u64, u32)> = counts.into_iter().collect();
    by_freq.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut code_of: HashMap<u64, u32> = HashMap::with_capacity(by_freq.len());
    for (code, &(value, _)) in by_freq.iter().enumerate() {
        code_of.insert(value, code as u32);
    }

    codes.clear();
    codes.reserve(input.len());
    for &v in input {
        codes.push(code_of[&v]);
    }

    values_sorted.clear();
    values_sorted.extend(by_freq.iter().map(|&(v, _)| v));
    values_sorted.sort_unstable();

    index_map.clear();
    index_map.reserve(values_sorted.len());
    for &v in values_sorted.iter() {
        index_map.push(code_of[&v]);
    }
}

/// Rebuilds the code-to-value table from the sorted dictionary and the
/// index permutation, then maps `codes` back to values.
pub fn decode_frequency_u32(
    codes: &[u32],
    values_sorted: &[u32],
    index_map: &[u32],
    out: &mut Vec<u32>,
) -> Result<()> {
    let table = build_inverse_table(values_sorted, index_map)?;
    out.clear();
    out.reserve(codes.len());
    for &code in codes {
        let value = *table
            .get(code as usize)
            .ok_or_else(|| DataFeedError::Overflow(format!("code {} out of range", code)))?;
        out.push(value);
    }
    Ok(())
}

/// `u64` counterpart of [`decode_frequency_u32`].
pub fn decode_frequency_u64(
    codes: &[u32],
    values_sorted: &[u64],
    index_map: &[u32],
    out: &mut Vec<u64>,
) -> Result<()> {
    let table = build_inverse_table(values_sorted, index_map)?;
    out.clear();
    out.reserve(codes.len());
    for &code in codes {
        let value = *table
            .get(code as usize)
            .ok_or_else(|| DataFeedError::Overflow(format!("code {} out of range", code)))?;
        out.push(value);
    }
    Ok(())
}

fn build_inverse_table<T: Copy + Default>(values_sorted: &[T], index_map: &[u32]) -> Result<Vec<T>> {
    if values_sorted.len() != index_map.len() {
        return Err(DataFeedError::Overflow(
            "dictionary and index permutation length mismatch".into(),
        ));
    }
    let len = values_sorted.len();
    let mut table = vec![T::default(); len];
    for (j, &code) in index_map.iter().enumerate() {
        if code as usize >= len {
            return Err(DataFeedError::Overflow(format!(
                "index permutation entry {} out of range",
                code
            )));
        }
        table[code as usize] = values_sorted[j];
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_u32(input: &[u32]) {
        let mut codes = Vec::new();
        let mut values = Vec::new();
        let mut index_map = Vec::new();
        encode_frequency_u32(input, &mut codes, &mut values, &mut index_map);

        // Dictionary is ascending and duplicate-free.
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values.len(), index_map.len());

        let mut decoded = Vec::new();
        decode_frequency_u32(&codes, &values, &index_map, &mut decoded).unwrap();
        assert_eq!(input, decoded.as_slice());
    }

    #[test]
    fn test_roundtrip_various_sizes() {
        roundtrip_u32(&[7]);
        roundtrip_u32(&[1, 1, 1, 2, 2, 3]);
        let big: Vec<u32> = (0..1000u32).map(|i| i.wrapping_mul(31) % 10 + 1).collect();
        roundtrip_u32(&big);
    }

    #[test]
    fn test_most_frequent_gets_smallest_code() {
        let input = [5u32, 5, 5, 9, 9, 2];
        let mut codes = Vec::new();
        let mut values = Vec::new();
        let mut index_map = Vec::new();
        encode_frequency_u32(&input, &mut codes, &mut values, &mut index_map);
        assert_eq!(codes[0], 0); // value 5 dominates
        // Equal counts break ties by ascending value: 2 before 9? No -
        // 9 occurs twice, 2 once, so 9 takes code 1 and 2 code 2.
        assert_eq!(codes[3], 1);
        assert_eq!(codes[5], 2);
    }

    #[test]
    fn test_u64_roundtrip() {
        let input: Vec<u64> = vec![1 << 40, 3, 3, 1 << 40, 7, 3];
        let mut codes = Vec::new();
        let mut values = Vec::new();
        let mut index_map = Vec::new();
        encode_frequency_u64(&input, &mut codes, &mut values, &mut index_map);

        let mut decoded = Vec::new();
        decode_frequency_u64(&codes, &values, &index_map, &mut decoded).unwrap();
        assert_eq!(input, decoded);
    }

    #[test]
    fn test_corrupt_permutation_rejected() {
        let values = [1u32, 2, 3];
        let index_map = [0u32, 1, 9]; // out of range
        let mut out = Vec::new();
        assert!(decode_frequency_u32(&[0], &values, &index_map, &mut out).is_err());
    }
}
