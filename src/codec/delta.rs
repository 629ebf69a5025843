//! Delta coding kernels.
//!
//! Successive-difference encoding against a carried "previous" scalar,
//! reversible in one pass with a running accumulator. The `u32` difference
//! kernel has an SSE2 fast path; everything reconstructing `i64` price
//! state is scalar.

use crate::codec::zigzag::{
    zigzag_decode_u32, zigzag_decode_u64, zigzag_encode_i64,
};
use crate::error::{DataFeedError, Result};

/// Computes zig-zag deltas of `values` against `initial`, storing them as
/// `u32`. Returns `false` without touching `out` fully when any delta
/// falls outside the `i32` range (caller re-encodes the column as u64).
pub fn try_delta_zigzag_u32(values: &[i64], initial: i64, out: &mut Vec<u32>) -> bool {
    out.clear();
    out.reserve(values.len());
    let mut prev = initial;
    for &v in values {
        let delta = v.wrapping_sub(prev);
        if delta > i64::from(i32::MAX) || delta < i64::from(i32::MIN) {
            return false;
        }
        out.push(zigzag_encode_i64(delta) as u32);
        prev = v;
    }
    true
}

/// Computes zig-zag deltas of `values` against `initial` as `u64`.
pub fn delta_zigzag_u64(values: &[i64], initial: i64, out: &mut Vec<u64>) {
    out.clear();
    out.reserve(values.len());
    let mut prev = initial;
    for &v in values {
        out.push(zigzag_encode_i64(v.wrapping_sub(prev)));
        prev = v;
    }
}

/// Reverses [`try_delta_zigzag_u32`]: accumulates decoded deltas from
/// `initial` back into absolute values.
pub fn accumulate_zigzag_u32(deltas: &[u32], initial: i64, out: &mut Vec<i64>) {
    out.clear();
    out.reserve(deltas.len());
    let mut acc = initial;
    for &d in deltas {
        acc = acc.wrapping_add(i64::from(zigzag_decode_u32(d)));
        out.push(acc);
    }
}

/// Reverses [`delta_zigzag_u64`].
pub fn accumulate_zigzag_u64(deltas: &[u64], initial: i64, out: &mut Vec<i64>) {
    out.clear();
    out.reserve(deltas.len());
    let mut acc = initial;
    for &d in deltas {
        acc = acc.wrapping_add(zigzag_decode_u64(d));
        out.push(acc);
    }
}

/// In-place successive differences over an ascending `u32` dictionary.
/// `values[0]` stays absolute.
pub fn encode_delta_sorted_u32(values: &mut [u32]) {
    if values.len() < 2 {
        return;
    }
    let mut diffs = vec![0u32; values.len() - 1];
    diff_u32(&values[..values.len() - 1], &values[1..], &mut diffs);
    values[1..].copy_from_slice(&diffs);
}

/// Reverses [`encode_delta_sorted_u32`] by prefix summation. Fails with
/// `Overflow` when the reconstructed sequence leaves the u32 range.
pub fn decode_delta_sorted_u32(values: &mut [u32]) -> Result<()> {
    for i in 1..values.len() {
        values[i] = values[i - 1]
            .checked_add(values[i])
            .ok_or_else(|| DataFeedError::Overflow("sorted dictionary prefix sum".into()))?;
    }
    Ok(())
}

/// In-place successive differences over an ascending `u64` dictionary.
pub fn encode_delta_sorted_u64(values: &mut [u64]) {
    for i in (1..values.len()).rev() {
        values[i] = values[i].wrapping_sub(values[i - 1]);
    }
}

/// Reverses [`encode_delta_sorted_u64`].
pub fn decode_delta_sorted_u64(values: &mut [u64]) -> Result<()> {
    for i in 1..values.len() {
        values[i] = values[i - 1]
            .checked_add(values[i])
            .ok_or_else(|| DataFeedError::Overflow("sorted dictionary prefix sum".into()))?;
    }
    Ok(())
}

/// In-place zig-zag delta over an index permutation (values < 2^31, so
/// differences always fit after folding).
pub fn encode_delta_zigzag_u32(values: &mut [u32]) {
    let mut prev: i64 = 0;
    for v in values.iter_mut() {
        let cur = i64::from(*v);
        *v = zigzag_encode_i64(cur - prev) as u32;
        prev = cur;
    }
}

/// Reverses [`encode_delta_zigzag_u32`].
pub fn decode_delta_zigzag_u32(values: &mut [u32]) -> Result<()> {
    let mut prev: i64 = 0;
    for v in values.iter_mut() {
        let cur = prev + i64::from(zigzag_decode_u32(*v));
        if cur < 0 || cur > i64::from(u32::MAX) {
            return Err(DataFeedError::Overflow("index permutation delta".into()));
        }
        *v = cur as u32;
        prev = cur;
    }
    Ok(())
}

/// Element-wise wrapping difference `out[i] = b[i] - a[i]`.
///
/// All three slices must share a length. SSE2 on x86_64, scalar elsewhere.
pub fn diff_u32(a: &[u32], b: &[u32], out: &mut [u32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { diff_u32_sse2(a, b, out) };
        return;
    }
    #[cfg(not(target_arch = "x86_64"))]
    diff_u32_scalar(a, b, out);
}

/// Scalar reference kernel for [`diff_u32`].
pub fn diff_u32_scalar(a: &[u32], b: &[u32], out: &mut [u32]) {
    for i in 0..a.len() {
        out[i] = b[i].wrapping_sub(a[i]);
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn diff_u32_sse2(a: &[u32], b: &[u32], out: &mut [u32]) {
    use std::arch::x86_64::*;

    let len = a.len();
    let chunks = len / 4;
    for i in 0..chunks {
        let va = _mm_loadu_si128(a.as_ptr().add(i * 4) as *const __m128i);
        let vb = _mm_loadu_si128(b.as_ptr().add(i * 4) as *const __m128i);
        let d = _mm_sub_epi32(vb, va);
        _mm_storeu_si128(out.as_mut_ptr().add(i * 4) as *mut __m128i, d);
    }
    for i in chunks * 4..len {
        out[i] = b[i].wrapping_sub(a[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_zigzag_u32_roundtrip() {
        let values: Vec<i64> = vec![1_000_000, 1_000_050, 999_900, 999_900, 1_000_100];
        let mut deltas = Vec::new();
        assert!(try_delta_zigzag_u32(&values, 1_000_000, &mut deltas));

        let mut back = Vec::new();
        accumulate_zigzag_u32(&deltas, 1_000_000, &mut back);
        assert_eq!(values, back);
    }

    #[test]
    fn test_delta_u32_overflow_promotes() {
        let values = vec![0i64, i64::from(i32::MAX) + 1];
        let mut deltas = Vec::new();
        assert!(!try_delta_zigzag_u32(&values, 0, &mut deltas));

        let mut deltas64 = Vec::new();
        delta_zigzag_u64(&values, 0, &mut deltas64);
        let mut back = Vec::new();
        accumulate_zigzag_u64(&deltas64, 0, &mut back);
        assert_eq!(values, back);
    }

    #[test]
    fn test_sorted_dictionary_roundtrip() {
        let mut values: Vec<u32> = vec![3, 10, 11, 500, 70_000, u32::MAX];
        let original = values.clone();
        encode_delta_sorted_u32(&mut values);
        decode_delta_sorted_u32(&mut values).unwrap();
        assert_eq!(values, original);

        let mut values64: Vec<u64> = vec![0, 1, 1 << 40, u64::MAX];
        let original64 = values64.clone();
        encode_delta_sorted_u64(&mut values64);
        decode_delta_sorted_u64(&mut values64).unwrap();
        assert_eq!(values64, original64);
    }

    #[test]
    fn test_index_permutation_roundtrip() {
        let mut values: Vec<u32> = vec![5, 0, 3, 4, 1, 2];
        let original = values.clone();
        encode_delta_zigzag_u32(&mut values);
        decode_delta_zigzag_u32(&mut values).unwrap();
        assert_eq!(values, original);
    }

    #[test]
    fn test_diff_simd_matches_scalar() {
        let a: Vec<u32> = (0..517u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        let b: Vec<u32> = a.iter().map(|v| v.wrapping_add(12345)).collect();

        let mut fast = vec![0u32; a.len()];
        let mut reference = vec![0u32; a.len()];
        diff_u32(&a, &b, &mut fast);
        diff_u32_scalar(&a, &b, &mut reference);
        assert_eq!(fast, reference);
    }
}
