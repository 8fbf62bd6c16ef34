//! # Data Model
//!
//! Core data structures for signature matching and multi-party grouping.
//! Records are addressed by (dataset, index) coordinates; the solver
//! gathers them into groups addressed by compact ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compact identifier for a source dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(pub u32);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Index of a record within its dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIndex(pub u32);

impl fmt::Display for RecordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A record reference: which dataset, which row.
///
/// Equality is componentwise; a record belongs to at most one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    /// The dataset this record comes from
    pub dataset: DatasetId,
    /// The record's index within its dataset
    pub record: RecordIndex,
}

impl RecordRef {
    /// Create a record reference from raw coordinates
    pub fn new(dataset: u32, record: u32) -> Self {
        Self {
            dataset: DatasetId(dataset),
            record: RecordIndex(record),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.record)
    }
}

/// A candidate edge: two records that may refer to the same entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub left: RecordRef,
    pub right: RecordRef,
}

impl Edge {
    /// Create a new candidate edge
    pub fn new(left: RecordRef, right: RecordRef) -> Self {
        Self { left, right }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.left, self.right)
    }
}

/// Compact identifier for solver groups.
///
/// Ids index the solver's group arena and are never reused within a
/// solve, so a `GroupId` names the same group object for its whole
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// A group of records deemed to represent the same entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier for this group
    pub id: GroupId,
    /// All records in this group, in insertion order
    pub records: Vec<RecordRef>,
}

impl Group {
    /// Create a new group
    pub fn new(id: GroupId, records: Vec<RecordRef>) -> Self {
        Self { id, records }
    }

    /// Get the number of records in this group
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if this group is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check if this group contains a specific record
    pub fn contains(&self, record: RecordRef) -> bool {
        self.records.contains(&record)
    }
}

/// Collection of groups produced by a solve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groups {
    /// All groups, in creation order
    pub groups: Vec<Group>,
}

impl Groups {
    /// Get the number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if there are no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of records across all groups
    pub fn total_records(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    /// Iterate over the groups
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }
}
