#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code so a bad configuration or a corrupt
// index file exits with a logged error instead of a panic.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::path::PathBuf;

use engine::KeyValueIndex;
use engine::bplus::BPlusTree;
use engine::classic::BTree;
use engine::config::EngineConfig;
use engine::disk::{DiskBTree, NodeFile};
use engine::simulation::{SimulationResult, Simulator, SimulatorConfig, WorkloadConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        order = config.order,
        seed = config.seed,
        operations = config.operations,
        key_space = config.key_space,
        data_directory = %config.data_directory.display(),
        "Loaded configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_directory) {
        tracing::error!("Failed to create data directory: {e}");
        std::process::exit(1);
    }

    let mut failures = 0;

    let mut bplus = match BPlusTree::<u64, u64>::new(config.order) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to build B+-tree: {e}");
            std::process::exit(1);
        }
    };
    failures += usize::from(!soak("bplus", &config, &mut bplus));

    let mut classic = match BTree::<u64, u64>::new(config.order) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to build B-tree: {e}");
            std::process::exit(1);
        }
    };
    failures += usize::from(!soak("classic", &config, &mut classic));

    let path = index_path(&config);
    if path.exists()
        && let Err(e) = std::fs::remove_file(&path)
    {
        tracing::error!("Failed to remove stale index file {}: {e}", path.display());
        std::process::exit(1);
    }
    let mut disk = match DiskBTree::<NodeFile, u64, u64>::create_file(&path, config.order) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to create index file {}: {e}", path.display());
            std::process::exit(1);
        }
    };
    failures += usize::from(!soak("disk", &config, &mut disk));
    if let Err(e) = disk.sync() {
        tracing::error!("Failed to sync index file: {e}");
        failures += 1;
    }
    tracing::info!(path = %path.display(), "index file kept for inspection");

    if failures > 0 {
        tracing::error!(failures, "soak run failed");
        std::process::exit(1);
    }
    tracing::info!("all trees agreed with the model");
}

fn index_path(config: &EngineConfig) -> PathBuf {
    config
        .data_directory
        .join(format!("soak-{}-{}.idx", config.seed, std::process::id()))
}

/// Run the configured workload against one tree and log the outcome.
fn soak<I>(name: &str, config: &EngineConfig, index: &mut I) -> bool
where
    I: KeyValueIndex<u64, u64>,
{
    let simulator_config = SimulatorConfig::new(config.seed)
        .with_workload(WorkloadConfig::default().with_key_space(config.key_space));
    let result = Simulator::new(simulator_config).run(index, config.operations);
    report(name, &result);
    result.passed()
}

fn report(name: &str, result: &SimulationResult) {
    if result.passed() {
        tracing::info!(
            tree = name,
            operations = result.operations_applied,
            inserts = result.inserts,
            removes = result.removes,
            searches = result.searches,
            final_len = result.final_len,
            "soak passed"
        );
        return;
    }

    tracing::error!(
        tree = name,
        operations = result.operations_applied,
        divergences = result.divergences.len(),
        violations = result.invariant_violations.len(),
        error = result.error.as_deref().unwrap_or("none"),
        "soak failed"
    );
    for divergence in result.divergences.iter().take(10) {
        tracing::error!(
            tree = name,
            operation_index = divergence.operation_index,
            "{}",
            divergence.description
        );
    }
    for violation in &result.invariant_violations {
        tracing::error!(tree = name, %violation, "invariant violated");
    }
}
