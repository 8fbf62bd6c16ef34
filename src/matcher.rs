//! # Top-k Matcher
//!
//! Scores one query signature against a packed buffer of candidates with
//! the Sørensen–Dice coefficient and keeps the best `k` scores at or
//! above a threshold.
//!
//! Two admission optimizations keep the scan cheap. A candidate whose
//! popcount differs from the query's by more than a threshold-derived
//! bound cannot reach the threshold and is skipped without touching its
//! signature bytes. Once the bounded heap is full, the admission
//! threshold rises to the score of every evicted candidate, so the tail
//! of the scan rejects earlier and earlier.

use crate::aligned::WordView;
use crate::config::MatchParams;
use crate::popcount::{self, WORD_BYTES};
use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Signature width the single-best convenience entry point assumes
pub const DEFAULT_KEY_BYTES: usize = 128;

/// A scored candidate: index into the candidate buffer plus Dice score
#[derive(Debug, Clone, Copy)]
pub struct ScoreNode {
    /// Position of the candidate in the packed buffer
    pub index: u32,
    /// Dice coefficient against the query, in [0, 1]
    pub score: f64,
}

impl PartialEq for ScoreNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoreNode {}

impl PartialOrd for ScoreNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreNode {
    /// Heap order: the greatest node is the worst kept candidate.
    ///
    /// Lower scores order greater; among equal scores the higher index
    /// orders greater, so it is evicted first and the drained output
    /// breaks ties by ascending index. This tiebreak is what makes the
    /// returned top-k deterministic.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Sørensen–Dice coefficient of two equal-length signatures.
///
/// Defined as 0.0 when both signatures are all-zero.
pub fn dice_coeff(a: &[u8], b: &[u8]) -> Result<f64> {
    if a.len() != b.len() {
        bail!("signature lengths differ: {} vs {}", a.len(), b.len());
    }
    let count_both = popcount::popcount_array(a) + popcount::popcount_array(b);
    if count_both == 0 {
        return Ok(0.0);
    }
    let count_and = popcount::popcount_logand(a, b);
    Ok(2.0 * f64::from(count_and) / f64::from(count_both))
}

/// Largest popcount difference between query and candidate that still
/// admits a Dice score of at least `threshold`.
///
/// Dice = 2·|A∩B|/(|A|+|B|) ≤ 2·min(|A|,|B|)/(|A|+|B|); requiring the
/// bound to reach the threshold gives |u − v| ≤ 2u(1/t − 1). The cast
/// saturates, which only ever admits more candidates.
#[inline]
fn max_popcount_delta(u_popc: u32, threshold: f64) -> u32 {
    (2.0 * f64::from(u_popc) * (1.0 / threshold - 1.0)) as u32
}

/// Bounded selection of the best `k` scores.
///
/// The backing storage is reserved to `k + 1` up front so pushes never
/// reallocate. The heap root is the worst kept candidate; every eviction
/// raises the admission threshold to the evicted score, and the
/// threshold never decreases.
#[derive(Debug)]
struct TopK {
    heap: BinaryHeap<ScoreNode>,
    k: usize,
    dynamic_threshold: f64,
}

impl TopK {
    fn new(k: usize, threshold: f64) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            dynamic_threshold: threshold,
        }
    }

    #[inline]
    fn push(&mut self, index: u32, score: f64) {
        if score >= self.dynamic_threshold {
            self.heap.push(ScoreNode { index, score });
            if self.heap.len() > self.k {
                if let Some(evicted) = self.heap.pop() {
                    self.dynamic_threshold = self.dynamic_threshold.max(evicted.score);
                }
            }
        }
    }

    /// Drain into a best-first vector: scores descending, ties by
    /// ascending index.
    fn into_sorted(mut self) -> Vec<ScoreNode> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(node) = self.heap.pop() {
            out.push(node);
        }
        out.reverse();
        out
    }
}

/// An all-zero query matches nothing under a strict threshold; under a
/// zero threshold every score is 0.0 and the first `k` candidate indices
/// are reported.
fn empty_query_matches(params: &MatchParams) -> Vec<ScoreNode> {
    if params.threshold > 0.0 {
        return Vec::new();
    }
    (0..params.k as u32)
        .map(|index| ScoreNode { index, score: 0.0 })
        .collect()
}

/// Score `one` against the candidates packed in `many` and return up to
/// `params.k` matches with score ≥ `params.threshold`, best first.
///
/// `counts_many` optionally carries precomputed candidate popcounts
/// (consistent with `many`); when absent they are computed here.
/// Signature widths that are a whole number of 64-bit words take the
/// word path; every other positive width takes the byte path.
pub fn match_one_against_many(
    one: &[u8],
    many: &[u8],
    counts_many: Option<&[u32]>,
    key_bytes: usize,
    params: &MatchParams,
) -> Result<Vec<ScoreNode>> {
    params.validate()?;
    if key_bytes == 0 {
        bail!("key_bytes must be positive");
    }
    if one.len() != key_bytes {
        bail!(
            "query length {} does not match key_bytes {}",
            one.len(),
            key_bytes
        );
    }
    if many.len() % key_bytes != 0 {
        bail!(
            "candidate buffer length {} is not a multiple of key_bytes {}",
            many.len(),
            key_bytes
        );
    }
    let n = many.len() / key_bytes;

    let owned_counts;
    let counts_many = match counts_many {
        Some(counts) => {
            if counts.len() != n {
                bail!("counts_many holds {} entries for {} candidates", counts.len(), n);
            }
            counts
        }
        None => {
            let mut counts = vec![0u32; n];
            popcount::popcount_many(&mut counts, many, key_bytes);
            owned_counts = counts;
            owned_counts.as_slice()
        }
    };

    let started = Instant::now();
    let matches = if key_bytes % WORD_BYTES == 0 {
        match_words(one, many, counts_many, key_bytes, params)
    } else {
        match_bytes(one, many, counts_many, key_bytes, params)
    };
    tracing::debug!(
        candidates = n,
        matched = matches.len(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1.0e3,
        "top-k match"
    );
    Ok(matches)
}

fn match_words(
    one: &[u8],
    many: &[u8],
    counts_many: &[u32],
    key_bytes: usize,
    params: &MatchParams,
) -> Vec<ScoreNode> {
    let key_words = key_bytes / WORD_BYTES;
    let one_view = WordView::new(one);
    let many_view = WordView::new(many);
    let count_one = popcount::popcount_words(&one_view);
    if count_one == 0 {
        return empty_query_matches(params);
    }

    let max_delta = if params.threshold > 0.0 {
        max_popcount_delta(count_one, params.threshold)
    } else {
        (key_bytes * 8) as u32
    };

    let mut top_k = TopK::new(params.k, params.threshold);
    // The production signature width gets its own loop so the AND-count
    // kernel is fully unrolled.
    if key_words == 16 {
        for (j, current) in many_view.chunks_exact(16).enumerate() {
            let count_j = counts_many[j];
            if count_one.abs_diff(count_j) <= max_delta {
                let count_and = popcount::popcount_logand_16(&one_view, current);
                top_k.push(
                    j as u32,
                    2.0 * f64::from(count_and) / f64::from(count_one + count_j),
                );
            }
        }
    } else {
        for (j, current) in many_view.chunks_exact(key_words).enumerate() {
            let count_j = counts_many[j];
            if count_one.abs_diff(count_j) <= max_delta {
                let count_and = popcount::popcount_logand_words(&one_view, current);
                top_k.push(
                    j as u32,
                    2.0 * f64::from(count_and) / f64::from(count_one + count_j),
                );
            }
        }
    }
    top_k.into_sorted()
}

fn match_bytes(
    one: &[u8],
    many: &[u8],
    counts_many: &[u32],
    key_bytes: usize,
    params: &MatchParams,
) -> Vec<ScoreNode> {
    let count_one = popcount::popcount_bytes(one);
    if count_one == 0 {
        return empty_query_matches(params);
    }

    let max_delta = if params.threshold > 0.0 {
        max_popcount_delta(count_one, params.threshold)
    } else {
        (key_bytes * 8) as u32
    };

    let mut scratch = vec![0u8; key_bytes];
    let mut top_k = TopK::new(params.k, params.threshold);
    for (j, current) in many.chunks_exact(key_bytes).enumerate() {
        let count_j = counts_many[j];
        if count_one.abs_diff(count_j) <= max_delta {
            let count_and = popcount::popcount_logand_bytes(one, current, &mut scratch);
            top_k.push(
                j as u32,
                2.0 * f64::from(count_and) / f64::from(count_one + count_j),
            );
        }
    }
    top_k.into_sorted()
}

/// Best single candidate at the default 128-byte signature width.
///
/// Candidate popcounts are computed internally. Returns `None` when
/// `many` holds no candidates.
pub fn best_match(one: &[u8], many: &[u8]) -> Result<Option<ScoreNode>> {
    let params = MatchParams::new(1, 0.0);
    let matches = match_one_against_many(one, many, None, DEFAULT_KEY_BYTES, &params)?;
    Ok(matches.into_iter().next())
}
