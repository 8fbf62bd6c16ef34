//! Deterministic generators and naive references shared by tests and
//! benchmarks. Included via `#[path]` from each consumer; not part of
//! the shipped library.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use siglink_rs::{Edge, RecordRef};

/// Generate `n` packed random signatures of `key_bytes` bytes each.
#[allow(dead_code)]
pub fn random_signatures(n: usize, key_bytes: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * key_bytes).map(|_| rng.random()).collect()
}

/// Generate one signature with roughly `density` of its bits set.
#[allow(dead_code)]
pub fn sparse_signature(key_bytes: usize, density: f64, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..key_bytes)
        .map(|_| {
            let mut byte = 0u8;
            for bit in 0..8 {
                if rng.random_bool(density) {
                    byte |= 1 << bit;
                }
            }
            byte
        })
        .collect()
}

/// Bit-by-bit Dice coefficient, the reference the kernels are checked
/// against. Defined as 0.0 when both operands are all-zero.
#[allow(dead_code)]
pub fn naive_dice(a: &[u8], b: &[u8]) -> f64 {
    let count_a: u32 = a.iter().map(|x| x.count_ones()).sum();
    let count_b: u32 = b.iter().map(|x| x.count_ones()).sum();
    if count_a + count_b == 0 {
        return 0.0;
    }
    let count_and: u32 = a.iter().zip(b).map(|(x, y)| (x & y).count_ones()).sum();
    2.0 * f64::from(count_and) / f64::from(count_a + count_b)
}

/// Reference top-k: score every candidate, filter by threshold, sort by
/// score descending with ascending index on ties, truncate to `k`.
#[allow(dead_code)]
pub fn naive_top_k(
    one: &[u8],
    many: &[u8],
    key_bytes: usize,
    k: usize,
    threshold: f64,
) -> Vec<(u32, f64)> {
    let n = many.len() / key_bytes;
    let mut scored: Vec<(u32, f64)> = (0..n)
        .map(|j| {
            let candidate = &many[j * key_bytes..(j + 1) * key_bytes];
            (j as u32, naive_dice(one, candidate))
        })
        .filter(|&(_, score)| score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Generate a random edge list over `n_datasets` datasets with
/// `records_per_dataset` records each.
#[allow(dead_code)]
pub fn random_edges(
    count: usize,
    n_datasets: u32,
    records_per_dataset: u32,
    seed: u64,
) -> Vec<Edge> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Edge::new(
                RecordRef::new(
                    rng.random_range(0..n_datasets),
                    rng.random_range(0..records_per_dataset),
                ),
                RecordRef::new(
                    rng.random_range(0..n_datasets),
                    rng.random_range(0..records_per_dataset),
                ),
            )
        })
        .collect()
}

/// Copy `bytes` into a buffer at an offset where u64 reads are
/// misaligned; returns the backing buffer and the offset.
#[allow(dead_code)]
pub fn misaligned_copy(bytes: &[u8]) -> (Vec<u8>, usize) {
    let mut backing = vec![0u8; bytes.len() + 8];
    let addr = backing.as_ptr() as usize;
    let offset = (9 - addr % 8) % 8;
    backing[offset..offset + bytes.len()].copy_from_slice(bytes);
    (backing, offset)
}
