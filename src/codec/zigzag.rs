//! Zig-zag mapping between signed and unsigned integers.
//!
//! `(x << 1) ^ (x >> (W-1))` folds negative values into the odd unsigned
//! numbers so that small-magnitude deltas stay small after packing. The
//! 32-bit slice kernels have an SSE2 fast path (always available on
//! x86_64) with a portable scalar fallback; the 64-bit kernels are scalar.

/// Encodes a single `i32`.
#[inline]
pub fn zigzag_encode_i32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Decodes a single `u32`.
#[inline]
pub fn zigzag_decode_u32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Encodes a single `i64`.
#[inline]
pub fn zigzag_encode_i64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Decodes a single `u64`.
#[inline]
pub fn zigzag_decode_u64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encodes a slice of `i32` into `out`. Slices must be the same length.
pub fn zigzag_encode_slice_i32(input: &[i32], out: &mut [u32]) {
    debug_assert_eq!(input.len(), out.len());
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { encode_slice_sse2(input, out) };
        return;
    }
    #[cfg(not(target_arch = "x86_64"))]
    zigzag_encode_slice_i32_scalar(input, out);
}

/// Decodes a slice of `u32` into `out`. Slices must be the same length.
pub fn zigzag_decode_slice_u32(input: &[u32], out: &mut [i32]) {
    debug_assert_eq!(input.len(), out.len());
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { decode_slice_sse2(input, out) };
        return;
    }
    #[cfg(not(target_arch = "x86_64"))]
    zigzag_decode_slice_u32_scalar(input, out);
}

/// Scalar reference kernel for the 32-bit encoder.
pub fn zigzag_encode_slice_i32_scalar(input: &[i32], out: &mut [u32]) {
    for (dst, &src) in out.iter_mut().zip(input.iter()) {
        *dst = zigzag_encode_i32(src);
    }
}

/// Scalar reference kernel for the 32-bit decoder.
pub fn zigzag_decode_slice_u32_scalar(input: &[u32], out: &mut [i32]) {
    for (dst, &src) in out.iter_mut().zip(input.iter()) {
        *dst = zigzag_decode_u32(src);
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn encode_slice_sse2(input: &[i32], out: &mut [u32]) {
    use std::arch::x86_64::*;

    let len = input.len();
    let chunks = len / 4;
    for i in 0..chunks {
        let p = input.as_ptr().add(i * 4) as *const __m128i;
        let x = _mm_loadu_si128(p);
        let enc = _mm_xor_si128(_mm_slli_epi32(x, 1), _mm_srai_epi32(x, 31));
        _mm_storeu_si128(out.as_mut_ptr().add(i * 4) as *mut __m128i, enc);
    }
    for i in chunks * 4..len {
        out[i] = zigzag_encode_i32(input[i]);
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn decode_slice_sse2(input: &[u32], out: &mut [i32]) {
    use std::arch::x86_64::*;

    let len = input.len();
    let chunks = len / 4;
    let ones = _mm_set1_epi32(1);
    for i in 0..chunks {
        let p = input.as_ptr().add(i * 4) as *const __m128i;
        let x = _mm_loadu_si128(p);
        let half = _mm_srli_epi32(x, 1);
        // -(x & 1) == sign-extended low bit
        let sign = _mm_sub_epi32(_mm_setzero_si128(), _mm_and_si128(x, ones));
        let dec = _mm_xor_si128(half, sign);
        _mm_storeu_si128(out.as_mut_ptr().add(i * 4) as *mut __m128i, dec);
    }
    for i in chunks * 4..len {
        out[i] = zigzag_decode_u32(input[i]);
    }
}
