//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the trees with:
//! - Reproducible random workloads
//! - In-memory record storage with fault injection
//! - Cross-checking against a reference `BTreeMap`
//! - Invariant checking at a fixed interval
//!
//! Given the same seed, execution is identical.
//!
//! # Usage
//!
//! ```
//! use engine::bplus::BPlusTree;
//! use engine::simulation::{Simulator, SimulatorConfig};
//!
//! let mut tree = BPlusTree::new(4).expect("order 4 is valid");
//! let result = Simulator::new(SimulatorConfig::new(12345)).run(&mut tree, 1000);
//!
//! assert!(result.passed());
//! ```

mod simulator;
mod storage;
mod workload;

pub use simulator::{Divergence, SimulationResult, Simulator, SimulatorConfig};
pub use storage::{FaultConfig, SimulatedStore, SimulatedStoreStats};
pub use workload::{Operation, WorkloadConfig, WorkloadGenerator};
