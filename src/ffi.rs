//! # C-ABI Boundary
//!
//! Host-agnostic synchronous entry points over raw pointers. Buffers are
//! caller-owned and pre-validated by the host; the core writes only to
//! output buffers. Errors surface as integer sentinels or null handles,
//! never as unwinding.

use crate::config::{MatchParams, SolveParams};
use crate::matcher::{self, DEFAULT_KEY_BYTES};
use crate::model::Groups;
use crate::popcount;
use crate::solver;
use std::slice;

/// Fill `counts_out[i]` with the popcount of the `i`-th signature in
/// `arrays`; returns the elapsed time in milliseconds.
///
/// # Safety
///
/// `arrays` must hold `n_arrays * array_bytes` readable bytes and
/// `counts_out` must hold `n_arrays` writable `u32` slots.
#[no_mangle]
pub unsafe extern "C" fn popcount_arrays(
    counts_out: *mut u32,
    arrays: *const u8,
    n_arrays: i32,
    array_bytes: i32,
) -> f64 {
    if n_arrays <= 0 || array_bytes <= 0 {
        return 0.0;
    }
    let n = n_arrays as usize;
    let width = array_bytes as usize;
    let counts = slice::from_raw_parts_mut(counts_out, n);
    let arrays = slice::from_raw_parts(arrays, n * width);
    popcount::popcount_many(counts, arrays, width)
}

/// Sørensen–Dice coefficient of two `array_bytes`-wide signatures.
///
/// # Safety
///
/// `a` and `b` must each hold `array_bytes` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn dice_coeff(a: *const u8, b: *const u8, array_bytes: i32) -> f64 {
    if array_bytes <= 0 {
        return 0.0;
    }
    let width = array_bytes as usize;
    let a = slice::from_raw_parts(a, width);
    let b = slice::from_raw_parts(b, width);
    matcher::dice_coeff(a, b).unwrap_or(0.0)
}

/// Top-k Dice matcher over raw host buffers.
///
/// Writes up to `k` matches, best first, into `out_indices` and
/// `out_scores` and returns how many were written. Returns -1 when
/// `key_bytes` is not positive or the parameters are out of range.
/// `counts_many` may be null; candidate popcounts are then computed
/// internally.
///
/// # Safety
///
/// `one` must hold `key_bytes` bytes, `many` must hold `n * key_bytes`
/// bytes, `counts_many` (when non-null) must hold `n` values consistent
/// with `many`, and the output buffers must hold `k` slots each.
#[no_mangle]
pub unsafe extern "C" fn match_one_against_many_dice_k_top(
    one: *const u8,
    many: *const u8,
    counts_many: *const u32,
    n: i32,
    key_bytes: i32,
    k: u32,
    threshold: f64,
    out_indices: *mut u32,
    out_scores: *mut f64,
) -> i32 {
    if n < 0 || key_bytes <= 0 {
        return -1;
    }
    let n = n as usize;
    let width = key_bytes as usize;
    let one = slice::from_raw_parts(one, width);
    let many = slice::from_raw_parts(many, n * width);
    let counts = if counts_many.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(counts_many, n))
    };
    let params = MatchParams::new(k as usize, threshold);
    let matches = match matcher::match_one_against_many(one, many, counts, width, &params) {
        Ok(matches) => matches,
        Err(_) => return -1,
    };
    let out_indices = slice::from_raw_parts_mut(out_indices, matches.len());
    let out_scores = slice::from_raw_parts_mut(out_scores, matches.len());
    for (i, node) in matches.iter().enumerate() {
        out_indices[i] = node.index;
        out_scores[i] = node.score;
    }
    matches.len() as i32
}

/// Best single match at the default 128-byte signature width.
///
/// Writes the best score to `score_out` and returns its candidate
/// index, or -1 when there are no candidates.
///
/// # Safety
///
/// `one` must hold 128 bytes, `many` must hold `n * 128` bytes and
/// `score_out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn match_one_against_many_dice(
    one: *const u8,
    many: *const u8,
    n: i32,
    score_out: *mut f64,
) -> i32 {
    if n < 0 {
        return -1;
    }
    let n = n as usize;
    let one = slice::from_raw_parts(one, DEFAULT_KEY_BYTES);
    let many = slice::from_raw_parts(many, n * DEFAULT_KEY_BYTES);
    match matcher::best_match(one, many) {
        Ok(Some(node)) => {
            *score_out = node.score;
            node.index as i32
        }
        Ok(None) | Err(_) => -1,
    }
}

/// Run the grouping solver over four parallel edge index arrays.
///
/// Returns an owned handle to the resulting groups; release it with
/// [`groups_free`]. Returns null when `merge_threshold` is out of range.
///
/// # Safety
///
/// Each index array must hold `n` readable values.
#[no_mangle]
pub unsafe extern "C" fn greedy_solve_inner(
    dset0: *const u32,
    rec0: *const u32,
    dset1: *const u32,
    rec1: *const u32,
    n: usize,
    merge_threshold: f64,
    deduplicated: bool,
) -> *mut Groups {
    let dset0 = slice::from_raw_parts(dset0, n);
    let rec0 = slice::from_raw_parts(rec0, n);
    let dset1 = slice::from_raw_parts(dset1, n);
    let rec1 = slice::from_raw_parts(rec1, n);
    let params = SolveParams::new(merge_threshold, deduplicated);
    match solver::greedy_solve_arrays(dset0, rec0, dset1, rec1, &params) {
        Ok(groups) => Box::into_raw(Box::new(groups)),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Number of groups behind a solve handle.
///
/// # Safety
///
/// `groups` must be a handle from [`greedy_solve_inner`] or null.
#[no_mangle]
pub unsafe extern "C" fn groups_count(groups: *const Groups) -> usize {
    if groups.is_null() {
        return 0;
    }
    (*groups).len()
}

/// Total number of records across all groups behind a solve handle.
///
/// # Safety
///
/// `groups` must be a handle from [`greedy_solve_inner`] or null.
#[no_mangle]
pub unsafe extern "C" fn groups_total_records(groups: *const Groups) -> usize {
    if groups.is_null() {
        return 0;
    }
    (*groups).total_records()
}

/// Flatten a solve handle: one size per group into `sizes_out`, then
/// every record's coordinates into `dsets_out`/`recs_out` in group
/// order.
///
/// # Safety
///
/// `groups` must be a handle from [`greedy_solve_inner`] or null.
/// `sizes_out` must hold [`groups_count`] slots; `dsets_out` and
/// `recs_out` must hold [`groups_total_records`] slots each.
#[no_mangle]
pub unsafe extern "C" fn groups_flatten(
    groups: *const Groups,
    sizes_out: *mut u32,
    dsets_out: *mut u32,
    recs_out: *mut u32,
) {
    if groups.is_null() {
        return;
    }
    let groups = &*groups;
    let sizes = slice::from_raw_parts_mut(sizes_out, groups.len());
    let total = groups.total_records();
    let dsets = slice::from_raw_parts_mut(dsets_out, total);
    let recs = slice::from_raw_parts_mut(recs_out, total);
    let mut cursor = 0;
    for (slot, group) in sizes.iter_mut().zip(groups.iter()) {
        *slot = group.len() as u32;
        for record in &group.records {
            dsets[cursor] = record.dataset.0;
            recs[cursor] = record.record.0;
            cursor += 1;
        }
    }
}

/// Release a handle returned by [`greedy_solve_inner`].
///
/// # Safety
///
/// `groups` must be a handle from [`greedy_solve_inner`] (or null) and
/// must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn groups_free(groups: *mut Groups) {
    if !groups.is_null() {
        drop(Box::from_raw(groups));
    }
}
