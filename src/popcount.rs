//! # Popcount Engine
//!
//! Population-count kernels for fixed-length bit-vector signatures: a
//! whole array, the bitwise AND of two arrays, and bulk counting over a
//! packed buffer of many signatures.
//!
//! When a buffer is a whole number of 64-bit words the word path runs:
//! counts accumulate into four independent lanes so consecutive popcounts
//! do not serialize on one register, with unrolled kernels at the common
//! signature widths (8, 16, 32 and 64 words) and a stepped 16/8/4/2/1
//! reduction for everything else. Other widths fall back to byte-wise
//! counting.

use crate::aligned::WordView;
use std::time::Instant;

/// Bytes per machine word of the word path
pub const WORD_BYTES: usize = 8;

/// Four independent popcount accumulators.
///
/// Splitting the running count across four lanes breaks the
/// read-modify-write dependency chain a single accumulator would force.
#[derive(Debug, Default, Clone, Copy)]
struct Lanes {
    c0: u64,
    c1: u64,
    c2: u64,
    c3: u64,
}

impl Lanes {
    /// Accumulate the popcount of four words, one per lane.
    #[inline(always)]
    fn add4(&mut self, w: &[u64]) {
        self.c0 += u64::from(w[0].count_ones());
        self.c1 += u64::from(w[1].count_ones());
        self.c2 += u64::from(w[2].count_ones());
        self.c3 += u64::from(w[3].count_ones());
    }

    /// Accumulate the popcount of the AND of two four-word blocks.
    ///
    /// The AND block is materialized first, then counted, so the counting
    /// step sees one contiguous block.
    #[inline(always)]
    fn add4_logand(&mut self, u: &[u64], v: &[u64]) {
        let combined = [u[0] & v[0], u[1] & v[1], u[2] & v[2], u[3] & v[3]];
        self.c0 += u64::from(combined[0].count_ones());
        self.c1 += u64::from(combined[1].count_ones());
        self.c2 += u64::from(combined[2].count_ones());
        self.c3 += u64::from(combined[3].count_ones());
    }

    #[inline(always)]
    fn sum(self) -> u32 {
        (self.c0 + self.c1 + self.c2 + self.c3) as u32
    }
}

/// Popcount of a word slice, stepped over progressively smaller blocks.
pub fn popcount_words(words: &[u64]) -> u32 {
    let mut lanes = Lanes::default();
    let mut rest = words;
    while rest.len() >= 16 {
        let (block, tail) = rest.split_at(16);
        lanes.add4(&block[0..4]);
        lanes.add4(&block[4..8]);
        lanes.add4(&block[8..12]);
        lanes.add4(&block[12..16]);
        rest = tail;
    }
    if rest.len() >= 8 {
        let (block, tail) = rest.split_at(8);
        lanes.add4(&block[0..4]);
        lanes.add4(&block[4..8]);
        rest = tail;
    }
    if rest.len() >= 4 {
        let (block, tail) = rest.split_at(4);
        lanes.add4(block);
        rest = tail;
    }
    if rest.len() >= 2 {
        lanes.c0 += u64::from(rest[0].count_ones());
        lanes.c1 += u64::from(rest[1].count_ones());
        rest = &rest[2..];
    }
    if let [last] = rest {
        lanes.c0 += u64::from(last.count_ones());
    }
    lanes.sum()
}

/// Popcount of the bitwise AND of two equal-length word slices.
pub fn popcount_logand_words(u: &[u64], v: &[u64]) -> u32 {
    debug_assert_eq!(u.len(), v.len());
    let mut lanes = Lanes::default();
    let mut u_rest = u;
    let mut v_rest = v;
    while u_rest.len() >= 4 {
        lanes.add4_logand(&u_rest[0..4], &v_rest[0..4]);
        u_rest = &u_rest[4..];
        v_rest = &v_rest[4..];
    }
    if u_rest.len() == 3 {
        lanes.c2 += u64::from((u_rest[2] & v_rest[2]).count_ones());
    }
    if u_rest.len() >= 2 {
        lanes.c1 += u64::from((u_rest[1] & v_rest[1]).count_ones());
    }
    if !u_rest.is_empty() {
        lanes.c0 += u64::from((u_rest[0] & v_rest[0]).count_ones());
    }
    lanes.sum()
}

/// 16-word (1024-bit) AND popcount, the production signature width.
#[inline]
pub(crate) fn popcount_logand_16(u: &[u64], v: &[u64]) -> u32 {
    debug_assert_eq!(u.len(), 16);
    debug_assert_eq!(v.len(), 16);
    let mut lanes = Lanes::default();
    lanes.add4_logand(&u[0..4], &v[0..4]);
    lanes.add4_logand(&u[4..8], &v[4..8]);
    lanes.add4_logand(&u[8..12], &v[8..12]);
    lanes.add4_logand(&u[12..16], &v[12..16]);
    lanes.sum()
}

/// Byte-wise popcount for widths that are not a whole number of words.
pub fn popcount_bytes(buf: &[u8]) -> u32 {
    buf.iter().map(|b| b.count_ones()).sum()
}

/// Byte-wise AND popcount; the AND is materialized into `scratch`.
pub(crate) fn popcount_logand_bytes(a: &[u8], b: &[u8], scratch: &mut [u8]) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), scratch.len());
    for ((out, &x), &y) in scratch.iter_mut().zip(a).zip(b) {
        *out = x & y;
    }
    popcount_bytes(scratch)
}

/// Number of 1-bits in `buf`.
///
/// Word path when the length is a whole number of words, byte-wise
/// otherwise.
pub fn popcount_array(buf: &[u8]) -> u32 {
    if !buf.is_empty() && buf.len() % WORD_BYTES == 0 {
        popcount_words(&WordView::new(buf))
    } else {
        popcount_bytes(buf)
    }
}

/// Number of 1-bits in the bitwise AND of `a` and `b`.
pub fn popcount_logand(a: &[u8], b: &[u8]) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    if !a.is_empty() && a.len() % WORD_BYTES == 0 {
        popcount_logand_words(&WordView::new(a), &WordView::new(b))
    } else {
        let mut scratch = vec![0u8; a.len()];
        popcount_logand_bytes(a, b, &mut scratch)
    }
}

/// Fully unrolled per-signature popcount for a compile-time word count.
fn popcount_arrays_fixed<const NWORDS: usize>(counts: &mut [u32], words: &[u64]) {
    for (count, sig) in counts.iter_mut().zip(words.chunks_exact(NWORDS)) {
        let mut lanes = Lanes::default();
        for block in sig.chunks_exact(4) {
            lanes.add4(block);
        }
        *count = lanes.sum();
    }
}

/// Fill `counts[i]` with the popcount of the `i`-th signature in
/// `arrays`, each `array_bytes` wide; returns elapsed wall time in
/// milliseconds.
///
/// Widths of 64, 128, 256 and 512 bytes dispatch to unrolled kernels;
/// other word-divisible widths use the stepped kernel; the rest count
/// byte-wise.
pub fn popcount_many(counts: &mut [u32], arrays: &[u8], array_bytes: usize) -> f64 {
    let narrays = counts.len();
    debug_assert!(arrays.len() >= narrays * array_bytes);
    let started = Instant::now();
    if array_bytes >= WORD_BYTES && array_bytes % WORD_BYTES == 0 {
        let nwords = array_bytes / WORD_BYTES;
        let view = WordView::new(&arrays[..narrays * array_bytes]);
        match nwords {
            64 => popcount_arrays_fixed::<64>(counts, &view),
            32 => popcount_arrays_fixed::<32>(counts, &view),
            16 => popcount_arrays_fixed::<16>(counts, &view),
            8 => popcount_arrays_fixed::<8>(counts, &view),
            _ => {
                for (count, sig) in counts.iter_mut().zip(view.chunks_exact(nwords)) {
                    *count = popcount_words(sig);
                }
            }
        }
    } else {
        for (i, count) in counts.iter_mut().enumerate() {
            *count = popcount_bytes(&arrays[i * array_bytes..(i + 1) * array_bytes]);
        }
    }
    let elapsed_ms = started.elapsed().as_secs_f64() * 1.0e3;
    tracing::debug!(narrays, array_bytes, elapsed_ms, "bulk popcount");
    elapsed_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn test_word_path_matches_byte_sum() {
        for &len in &[8usize, 16, 24, 64, 128, 136, 512, 1024] {
            let buf = patterned(len, 7);
            let expected: u32 = buf.iter().map(|b| b.count_ones()).sum();
            assert_eq!(popcount_array(&buf), expected, "len {}", len);
        }
    }

    #[test]
    fn test_byte_fallback_matches_byte_sum() {
        for &len in &[1usize, 3, 7, 9, 130] {
            let buf = patterned(len, 3);
            let expected: u32 = buf.iter().map(|b| b.count_ones()).sum();
            assert_eq!(popcount_array(&buf), expected, "len {}", len);
        }
    }

    #[test]
    fn test_logand_equals_popcount_of_and() {
        for &len in &[8usize, 40, 128, 200, 9, 13] {
            let a = patterned(len, 11);
            let b = patterned(len, 101);
            let anded: Vec<u8> = a.iter().zip(&b).map(|(&x, &y)| x & y).collect();
            assert_eq!(popcount_logand(&a, &b), popcount_array(&anded), "len {}", len);
        }
    }

    #[test]
    fn test_logand_bounded_by_operands() {
        let a = patterned(256, 5);
        let b = patterned(256, 77);
        let both = popcount_logand(&a, &b);
        assert!(both <= popcount_array(&a).min(popcount_array(&b)));
    }

    #[test]
    fn test_logand_16_matches_generic() {
        let a = patterned(128, 21);
        let b = patterned(128, 22);
        let u = WordView::new(&a);
        let v = WordView::new(&b);
        assert_eq!(popcount_logand_16(&u, &v), popcount_logand_words(&u, &v));
    }

    #[test]
    fn test_popcount_many_fixed_widths() {
        for &width in &[64usize, 128, 256, 512, 72, 40] {
            let narrays = 9;
            let arrays = patterned(narrays * width, 1);
            let mut counts = vec![0u32; narrays];
            popcount_many(&mut counts, &arrays, width);
            for i in 0..narrays {
                let expected = popcount_array(&arrays[i * width..(i + 1) * width]);
                assert_eq!(counts[i], expected, "width {} array {}", width, i);
            }
        }
    }

    #[test]
    fn test_popcount_many_byte_width() {
        let width = 10;
        let narrays = 5;
        let arrays = patterned(narrays * width, 9);
        let mut counts = vec![0u32; narrays];
        popcount_many(&mut counts, &arrays, width);
        for i in 0..narrays {
            let expected = popcount_bytes(&arrays[i * width..(i + 1) * width]);
            assert_eq!(counts[i], expected);
        }
    }

    #[test]
    fn test_all_ones_and_zeros() {
        let ones = vec![0xFFu8; 128];
        let zeros = vec![0u8; 128];
        assert_eq!(popcount_array(&ones), 1024);
        assert_eq!(popcount_array(&zeros), 0);
        assert_eq!(popcount_logand(&ones, &zeros), 0);
        assert_eq!(popcount_logand(&ones, &ones), 1024);
    }
}
