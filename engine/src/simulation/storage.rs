//! Simulated in-memory record store for deterministic testing.
//!
//! This module provides an in-memory implementation of [`RecordStore`]
//! with support for fault injection at various levels:
//! - Record-level read/write errors
//! - Byte-level corruption (bit flips)
//! - Partial writes
//! - Sync failures

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::disk::{
    Position, Record, RecordLayout, RecordStore, StorageError, Superblock,
};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability of record corruption on read (0.0 - 1.0).
    pub corruption_rate: f64,
    /// Probability of partial write (0.0 - 1.0).
    pub partial_write_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
            corruption_rate: 0.001,
            partial_write_rate: 0.001,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.05,
            write_error_rate: 0.05,
            sync_error_rate: 0.05,
            corruption_rate: 0.05,
            partial_write_rate: 0.05,
        }
    }
}

/// Statistics about simulated store operations.
#[derive(Debug, Default, Clone)]
pub struct SimulatedStoreStats {
    /// Number of record reads.
    pub reads: u64,
    /// Number of record writes.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
    /// Number of corrupted records returned.
    pub corrupted_reads: u64,
    /// Number of partial writes.
    pub partial_writes: u64,
}

impl SimulatedStoreStats {
    /// Total number of faults injected.
    #[must_use]
    pub const fn injected_faults(&self) -> u64 {
        self.injected_read_errors
            + self.injected_write_errors
            + self.injected_sync_errors
            + self.corrupted_reads
            + self.partial_writes
    }
}

/// In-memory record store for deterministic testing.
///
/// Records live in a map keyed by position. The persisted superblock image
/// is kept apart from the live superblock so that [`SimulatedStore::reopen`]
/// sees only what was written with `write_superblock`.
///
/// Not thread-safe; simulations run on a single thread.
pub struct SimulatedStore {
    records: HashMap<Position, Record>,
    superblock: Superblock,
    persisted_superblock: Record,

    fault_config: FaultConfig,
    rng: StdRng,

    stats: SimulatedStoreStats,
}

impl SimulatedStore {
    /// Create an empty store for `layout` with the given seed.
    ///
    /// The seed ensures deterministic behavior - the same seed will
    /// produce the same sequence of faults.
    #[must_use]
    pub fn new(layout: RecordLayout, seed: u64) -> Self {
        Self::with_config(layout, seed, FaultConfig::default())
    }

    /// Create an empty store with custom fault configuration.
    #[must_use]
    pub fn with_config(layout: RecordLayout, seed: u64, fault_config: FaultConfig) -> Self {
        let superblock = Superblock::new(layout);
        Self {
            records: HashMap::new(),
            persisted_superblock: superblock.to_record(),
            superblock,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: SimulatedStoreStats::default(),
        }
    }

    /// Simulate closing and reopening the store.
    ///
    /// Unpersisted superblock changes are lost; written records survive.
    pub fn reopen(self) -> Result<Self, StorageError> {
        let superblock = Superblock::from_record(&self.persisted_superblock)?;
        Ok(Self { superblock, ..self })
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &SimulatedStoreStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats = SimulatedStoreStats::default();
    }

    /// Update the fault configuration.
    pub const fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Corrupt a record by flipping random bits.
    fn corrupt_record(&mut self, record: &mut Record) {
        let num_flips = self.rng.random_range(1..=8);
        let bytes = record.as_bytes_mut();
        for _ in 0..num_flips {
            let byte_offset = self.rng.random_range(0..bytes.len());
            let bit = self.rng.random_range(0..8u8);
            bytes[byte_offset] ^= 1 << bit;
        }
    }

    /// Simulate a torn write by zeroing the tail of the record.
    fn make_partial_write(&mut self, record: &mut Record) {
        let bytes = record.as_bytes_mut();
        let cutoff = self.rng.random_range(0..bytes.len());
        for byte in bytes.iter_mut().skip(cutoff) {
            *byte = 0;
        }
    }
}

impl RecordStore for SimulatedStore {
    fn read_record(&mut self, position: Position) -> Result<Record, StorageError> {
        self.stats.reads += 1;
        crate::disk::check_position(&self.superblock, position)?;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            tracing::warn!(position, "injected read error");
            return Err(StorageError::InjectedFault(format!(
                "simulated read error at position {position}"
            )));
        }

        let mut record = match self.records.get(&position) {
            Some(record) => record.clone(),
            None => Record::new(self.superblock.layout.record_size()),
        };

        if self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            tracing::warn!(position, "injected record corruption");
            self.corrupt_record(&mut record);
        }

        Ok(record)
    }

    fn write_record(&mut self, position: Position, record: &Record) -> Result<(), StorageError> {
        self.stats.writes += 1;
        crate::disk::check_position(&self.superblock, position)?;
        crate::disk::check_record_size(&self.superblock, record)?;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            tracing::warn!(position, "injected write error");
            return Err(StorageError::InjectedFault(format!(
                "simulated write error at position {position}"
            )));
        }

        let mut stored = record.clone();
        if self.should_inject_fault(self.fault_config.partial_write_rate) {
            self.stats.partial_writes += 1;
            tracing::warn!(position, "injected partial write");
            self.make_partial_write(&mut stored);
        }

        self.records.insert(position, stored);
        Ok(())
    }

    fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    fn write_superblock(&mut self) -> Result<(), StorageError> {
        self.persisted_superblock = self.superblock.to_record();
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            tracing::warn!("injected sync error");
            return Err(StorageError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        // Writes are already "durable" in memory.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RecordLayout {
        RecordLayout::for_codecs::<u64, u64>(2).expect("valid layout")
    }

    fn store() -> SimulatedStore {
        let mut store = SimulatedStore::new(layout(), 12345);
        store.superblock_mut().next_position = 4;
        store
    }

    #[test]
    fn test_simulated_store_basic() {
        let mut store = store();

        let mut record = Record::new(layout().record_size());
        record.write_bytes(16, b"hello world");
        store.write_record(2, &record).expect("write record");

        let read = store.read_record(2).expect("read record");
        assert_eq!(read.read_bytes(16, 11), b"hello world");
        assert_eq!(store.stats().reads, 1);
        assert_eq!(store.stats().writes, 1);
    }

    #[test]
    fn test_simulated_store_bounds() {
        let mut store = store();
        assert!(matches!(
            store.read_record(4),
            Err(StorageError::PositionOutOfBounds {
                position: 4,
                allocated: 4,
            })
        ));
        assert!(matches!(
            store.write_record(0, &Record::new(3)),
            Err(StorageError::RecordSizeMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn test_reopen_keeps_only_persisted_superblock() {
        let mut store = store();
        store.write_superblock().expect("write superblock");
        store.superblock_mut().entry_count = 99;

        let store = store.reopen().expect("reopen");
        assert_eq!(store.superblock().next_position, 4);
        assert_eq!(store.superblock().entry_count, 0);
    }

    #[test]
    fn test_simulated_store_fault_injection() {
        let config = FaultConfig {
            read_error_rate: 1.0,
            write_error_rate: 1.0,
            sync_error_rate: 1.0,
            ..FaultConfig::default()
        };
        let mut store = SimulatedStore::with_config(layout(), 12345, config);
        store.superblock_mut().next_position = 1;

        assert!(matches!(
            store.read_record(0),
            Err(StorageError::InjectedFault(_))
        ));
        let record = Record::new(layout().record_size());
        assert!(store.write_record(0, &record).is_err());
        assert!(store.sync().is_err());
        assert_eq!(store.stats().injected_faults(), 3);

        store.set_fault_config(FaultConfig::no_faults());
        store.write_record(0, &record).expect("write after faults cleared");
        store.reset_stats();
        assert_eq!(store.stats().injected_faults(), 0);
    }

    #[test]
    fn test_simulated_store_corruption() {
        let config = FaultConfig {
            corruption_rate: 1.0,
            ..FaultConfig::default()
        };
        let mut store = SimulatedStore::with_config(layout(), 12345, config);
        store.superblock_mut().next_position = 1;

        let mut record = Record::new(layout().record_size());
        record.seal(8);
        store.write_record(0, &record).expect("write record");

        store.read_record(0).expect("read record");
        store.read_record(0).expect("read record");
        assert_eq!(store.stats().corrupted_reads, 2);
    }

    #[test]
    fn test_simulated_store_deterministic() {
        let run = |seed| {
            let mut store = SimulatedStore::with_config(layout(), seed, FaultConfig::high_faults());
            store.superblock_mut().next_position = 1;
            let record = Record::new(layout().record_size());
            (0..200)
                .map(|_| store.write_record(0, &record).is_ok())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
