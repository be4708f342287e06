// Three ordered key-value indexes behind one operation surface:
// 1. `bplus`: B+-tree whose leaves absorb inserts in an overflow buffer
//    and link to their right sibling
// 2. `classic`: in-memory B-tree with keys and values in every node
// 3. `disk`: the same classic B-tree, one fixed-size record per node
//
// Life of an operation on the disk tree:
//  - Read the root record, verify its checksum, decode it into a node
//  - Descend, splitting or refilling children ahead of the walk
//  - Write every touched record back, then the superblock
//
// Supporting components:
//  - Invariant checks shared by all trees
//  - Deterministic simulation against a `BTreeMap` model
//  - Environment configuration for the soak driver

pub mod bplus;
pub mod classic;
pub mod config;
pub mod disk;
pub mod index;
pub mod invariants;
pub mod simulation;

#[cfg(test)]
mod testing;

pub use index::{KeyValueIndex, MIN_ORDER, OrderError};
pub use invariants::InvariantViolation;
