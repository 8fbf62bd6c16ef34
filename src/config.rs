//! # Tuning Parameters
//!
//! Validated parameter structs for the matcher and the solver. Both are
//! plain data; validation happens at the entry points that consume them.

use anyhow::{bail, Result};

/// Matcher parameters: result size and admission threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    /// Maximum number of matches to keep.
    pub k: usize,
    /// Minimum Dice score for a candidate to be reported, in [0, 1].
    /// At 0.0 every candidate is admissible.
    pub threshold: f64,
}

impl MatchParams {
    /// Create matcher parameters
    pub fn new(k: usize, threshold: f64) -> Self {
        Self { k, threshold }
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("threshold must be in [0, 1] (got {})", self.threshold);
        }
        Ok(())
    }
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            k: 1,
            threshold: 0.0,
        }
    }
}

/// Solver parameters: how much of the bipartite cross-edge product must
/// be observed before two groups merge, and whether datasets are assumed
/// to hold no internal duplicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveParams {
    /// Fraction of cross-edges required to merge two groups, in (0, 1].
    /// At 1.0 the bipartite subgraph between them must be complete.
    pub merge_threshold: f64,
    /// When set, a group never holds two records of the same dataset.
    pub deduplicated: bool,
}

impl SolveParams {
    /// Create solver parameters
    pub fn new(merge_threshold: f64, deduplicated: bool) -> Self {
        Self {
            merge_threshold,
            deduplicated,
        }
    }

    /// Check the parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.merge_threshold > 0.0 && self.merge_threshold <= 1.0) {
            bail!(
                "merge_threshold must be in (0, 1] (got {})",
                self.merge_threshold
            );
        }
        Ok(())
    }
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            merge_threshold: 1.0,
            deduplicated: true,
        }
    }
}
