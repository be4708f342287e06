use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::disk::{DiskBTree, DiskTreeError, NodeFile, RecordLayout};
use crate::simulation::{FaultConfig, SimulatedStore};

static TEST_INDEX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Build a unique index file path inside `dir`.
pub fn unique_index_path(dir: &Path) -> PathBuf {
    let counter = TEST_INDEX_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.join(format!("engine_test_{}_{counter}.idx", std::process::id()))
}

/// Create a new file-backed test tree inside `dir`.
pub fn new_file_tree(
    dir: &Path,
    min_degree: usize,
) -> Result<DiskBTree<NodeFile, u64, u64>, DiskTreeError> {
    DiskBTree::create_file(&unique_index_path(dir), min_degree)
}

/// Create a disk tree over a fault-free in-memory store.
pub fn new_memory_tree(
    min_degree: usize,
) -> Result<DiskBTree<SimulatedStore, u64, u64>, DiskTreeError> {
    new_faulty_memory_tree(min_degree, FaultConfig::no_faults())
}

/// Create a disk tree over an in-memory store that starts injecting
/// `faults` once the empty root is in place.
pub fn new_faulty_memory_tree(
    min_degree: usize,
    faults: FaultConfig,
) -> Result<DiskBTree<SimulatedStore, u64, u64>, DiskTreeError> {
    let layout = RecordLayout::for_codecs::<u64, u64>(min_degree)?;
    let mut tree = DiskBTree::new(SimulatedStore::new(layout, min_degree as u64))?;
    tree.store_mut().set_fault_config(faults);
    Ok(tree)
}
