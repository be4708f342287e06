//! Workload generator for deterministic simulation testing.
//!
//! This module generates random but reproducible sequences of point
//! operations over a bounded key space, so inserts collide with existing
//! keys and removes hit both present and absent keys.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A single index operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<K, V> {
    /// Insert or overwrite a key.
    Insert(K, V),
    /// Remove a key.
    Remove(K),
    /// Look up a key.
    Search(K),
}

impl<K, V> Operation<K, V> {
    /// The key the operation targets.
    pub const fn key(&self) -> &K {
        match self {
            Self::Insert(key, _) | Self::Remove(key) | Self::Search(key) => key,
        }
    }
}

/// Configuration for workload generation.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Keys are drawn uniformly from `0..key_space`.
    pub key_space: u64,
    /// Relative weight of inserts.
    pub insert_weight: u32,
    /// Relative weight of removes.
    pub remove_weight: u32,
    /// Relative weight of searches.
    pub search_weight: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            key_space: 4096,
            insert_weight: 5,
            remove_weight: 3,
            search_weight: 2,
        }
    }
}

impl WorkloadConfig {
    /// Set the key space.
    #[must_use]
    pub const fn with_key_space(mut self, key_space: u64) -> Self {
        self.key_space = key_space;
        self
    }

    /// Set the operation weights.
    #[must_use]
    pub const fn with_weights(mut self, insert: u32, remove: u32, search: u32) -> Self {
        self.insert_weight = insert;
        self.remove_weight = remove;
        self.search_weight = search;
        self
    }
}

/// Generator for random [`Operation`] sequences.
///
/// The same seed and config always yield the same sequence.
pub struct WorkloadGenerator {
    rng: StdRng,
    config: WorkloadConfig,
}

impl WorkloadGenerator {
    /// Create a new generator with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, WorkloadConfig::default())
    }

    /// Create a new generator with custom configuration.
    #[must_use]
    pub fn with_config(seed: u64, config: WorkloadConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Generate the next operation.
    pub fn next_operation(&mut self) -> Operation<u64, u64> {
        let key = self.rng.random_range(0..self.config.key_space.max(1));
        let insert = self.config.insert_weight;
        let remove = self.config.remove_weight;
        let total = insert + remove + self.config.search_weight;
        if total == 0 {
            return Operation::Search(key);
        }

        let roll = self.rng.random_range(0..total);
        if roll < insert {
            Operation::Insert(key, self.rng.random())
        } else if roll < insert + remove {
            Operation::Remove(key)
        } else {
            Operation::Search(key)
        }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = Operation<u64, u64>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_operation())
    }
}
