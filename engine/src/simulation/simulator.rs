//! Main simulator harness for deterministic simulation testing.
//!
//! The simulator replays a generated workload against any
//! [`KeyValueIndex`] and against a `BTreeMap` model, reporting every point
//! where the two disagree and every invariant the index breaks.

use std::collections::BTreeMap;

use crate::index::KeyValueIndex;
use crate::invariants::InvariantViolation;

use super::workload::{Operation, WorkloadConfig, WorkloadGenerator};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Workload generation configuration.
    pub workload: WorkloadConfig,
    /// Check invariants every this many operations (0 disables periodic
    /// checks; the final check always runs).
    pub check_interval: u64,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            workload: WorkloadConfig::default(),
            check_interval: 100,
        }
    }

    /// Set the workload configuration.
    #[must_use]
    pub const fn with_workload(mut self, workload: WorkloadConfig) -> Self {
        self.workload = workload;
        self
    }

    /// Set the invariant check interval.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: u64) -> Self {
        self.check_interval = interval;
        self
    }
}

/// A disagreement between the index and the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Zero-based index of the operation in the run.
    pub operation_index: u64,
    /// What the index answered and what the model expected.
    pub description: String,
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of operations applied.
    pub operations_applied: u64,
    /// Number of inserts applied.
    pub inserts: u64,
    /// Number of removes applied.
    pub removes: u64,
    /// Number of searches applied.
    pub searches: u64,
    /// Entries in the model when the run ended.
    pub final_len: usize,
    /// Disagreements with the model.
    pub divergences: Vec<Divergence>,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether every operation ran without an index error.
    pub completed_successfully: bool,
    /// Error message if the index failed.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully
            && self.divergences.is_empty()
            && self.invariant_violations.is_empty()
    }
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    generator: WorkloadGenerator,
    model: BTreeMap<u64, u64>,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let generator = WorkloadGenerator::with_config(config.seed, config.workload.clone());
        Self {
            config,
            generator,
            model: BTreeMap::new(),
        }
    }

    /// The reference model after the last run.
    #[must_use]
    pub const fn model(&self) -> &BTreeMap<u64, u64> {
        &self.model
    }

    /// Apply `operation_count` generated operations to `index`.
    ///
    /// The index must start empty. The run stops at the first index error.
    pub fn run<I>(&mut self, index: &mut I, operation_count: u64) -> SimulationResult
    where
        I: KeyValueIndex<u64, u64> + ?Sized,
    {
        self.model.clear();
        let mut result = SimulationResult {
            seed: self.config.seed,
            operations_applied: 0,
            inserts: 0,
            removes: 0,
            searches: 0,
            final_len: 0,
            divergences: Vec::new(),
            invariant_violations: Vec::new(),
            completed_successfully: true,
            error: None,
        };

        for operation_index in 0..operation_count {
            let operation = self.generator.next_operation();
            if let Err(e) = self.apply(index, operation, operation_index, &mut result) {
                tracing::warn!(operation_index, error = %e, "index failed during simulation");
                result.completed_successfully = false;
                result.error = Some(format!("operation {operation_index} ({operation:?}): {e}"));
                break;
            }
            result.operations_applied += 1;

            let interval = self.config.check_interval;
            if interval > 0 && (operation_index + 1) % interval == 0 {
                Self::check(index, operation_index, &mut result);
            }
        }

        if result.completed_successfully {
            Self::check(index, result.operations_applied, &mut result);
            if let Err(e) = self.verify_contents(index, &mut result) {
                result.completed_successfully = false;
                result.error = Some(format!("final verification: {e}"));
            }
        }
        result.final_len = self.model.len();

        tracing::debug!(
            seed = result.seed,
            operations = result.operations_applied,
            divergences = result.divergences.len(),
            violations = result.invariant_violations.len(),
            "simulation finished"
        );
        result
    }

    fn apply<I>(
        &mut self,
        index: &mut I,
        operation: Operation<u64, u64>,
        operation_index: u64,
        result: &mut SimulationResult,
    ) -> Result<(), I::Error>
    where
        I: KeyValueIndex<u64, u64> + ?Sized,
    {
        let mismatch = match operation {
            Operation::Insert(key, value) => {
                result.inserts += 1;
                let actual = index.insert(key, value)?;
                let expected = self.model.insert(key, value);
                (actual != expected).then(|| format!("returned {actual:?}, model {expected:?}"))
            }
            Operation::Remove(key) => {
                result.removes += 1;
                let actual = index.remove(&key)?;
                let expected = self.model.remove(&key).is_some();
                (actual != expected).then(|| format!("returned {actual}, model {expected}"))
            }
            Operation::Search(key) => {
                result.searches += 1;
                let actual = index.search(&key)?;
                let expected = self.model.get(&key).copied();
                (actual != expected).then(|| format!("returned {actual:?}, model {expected:?}"))
            }
        };

        if let Some(detail) = mismatch {
            result.divergences.push(Divergence {
                operation_index,
                description: format!("{operation:?}: {detail}"),
            });
        }
        if index.len() != self.model.len() {
            result.divergences.push(Divergence {
                operation_index,
                description: format!(
                    "{operation:?}: index holds {} entries, model {}",
                    index.len(),
                    self.model.len()
                ),
            });
        }
        Ok(())
    }

    fn check<I>(index: &mut I, operation_index: u64, result: &mut SimulationResult)
    where
        I: KeyValueIndex<u64, u64> + ?Sized,
    {
        if let Err(violation) = index.check_invariants() {
            tracing::warn!(operation_index, %violation, "invariant violated");
            result.invariant_violations.push(violation);
        }
    }

    /// Every model entry must be retrievable from the index.
    fn verify_contents<I>(&self, index: &mut I, result: &mut SimulationResult) -> Result<(), I::Error>
    where
        I: KeyValueIndex<u64, u64> + ?Sized,
    {
        for (key, value) in &self.model {
            let found = index.search(key)?;
            if found != Some(*value) {
                result.divergences.push(Divergence {
                    operation_index: result.operations_applied,
                    description: format!("key {key}: index holds {found:?}, model {value}"),
                });
            }
        }
        Ok(())
    }
}
