//! # Siglink
//!
//! Computational core of a privacy-preserving record-linkage library.
//!
//! Two subsystems share this crate. The similarity kernel scores
//! fixed-length bit-vector signatures with the Sørensen–Dice
//! coefficient, built on popcount kernels with an early-reject bound and
//! a bounded top-k selection. The grouping solver consumes a stream of
//! candidate edges and greedily maintains disjoint groups of records,
//! merging two groups only once the cross-edges between them are
//! complete enough. A C-ABI boundary exposes both to host runtimes.
//!
//! The core is single-threaded and synchronous: every call runs to
//! completion on the caller's thread, holds no global state, and frees
//! its scratch on return.

pub mod aligned;
pub mod config;
pub mod ffi;
pub mod matcher;
pub mod model;
pub mod popcount;
pub mod solver;

// Re-export main types for convenience
pub use aligned::WordView;
pub use config::{MatchParams, SolveParams};
pub use matcher::{best_match, dice_coeff, match_one_against_many, ScoreNode};
pub use model::{DatasetId, Edge, Group, GroupId, Groups, RecordIndex, RecordRef};
pub use popcount::{popcount_array, popcount_logand, popcount_many};
pub use solver::{greedy_solve, greedy_solve_arrays, GreedySolver};
