//! Soak driver configuration module.
//!
//! This module provides configuration loading for the `engine` binary from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `ENGINE_ORDER`: Order (minimum degree) used for every tree (default: `32`)
//! - `ENGINE_SEED`: Seed for the generated workload (default: `42`)
//! - `ENGINE_OPERATIONS`: Operations applied to each tree (default: `10000`)
//! - `ENGINE_KEY_SPACE`: Keys are drawn from `0..key_space` (default: `4096`)
//! - `ENGINE_DATA_DIRECTORY`: Directory for the disk tree's file (default: `./data`)
//!
//! # Invariants
//!
//! - `order` is always at least [`MIN_ORDER`](crate::index::MIN_ORDER) and at
//!   most [`MAX_MIN_DEGREE`]
//! - `key_space` is never zero

use std::path::PathBuf;
use std::str::FromStr;

use crate::disk::MAX_MIN_DEGREE;
use crate::index::check_order;

/// Soak driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Order of the B+-tree and minimum degree of both classic trees.
    pub order: usize,
    /// Workload seed.
    pub seed: u64,
    /// Number of operations per tree.
    pub operations: u64,
    /// Size of the key space.
    pub key_space: u64,
    /// Directory where the disk tree's file is created.
    pub data_directory: PathBuf,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order: Self::DEFAULT_ORDER,
            seed: Self::DEFAULT_SEED,
            operations: Self::DEFAULT_OPERATIONS,
            key_space: Self::DEFAULT_KEY_SPACE,
            data_directory: PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
        }
    }
}

impl EngineConfig {
    /// Default tree order.
    pub const DEFAULT_ORDER: usize = 32;
    /// Default workload seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default number of operations.
    pub const DEFAULT_OPERATIONS: u64 = 10_000;
    /// Default key space.
    pub const DEFAULT_KEY_SPACE: u64 = 4096;
    /// Default data directory.
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";

    /// Load configuration from environment variables.
    ///
    /// Unset variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let order = load_number(&lookup, "ENGINE_ORDER", Self::DEFAULT_ORDER)?;
        check_order(order).map_err(|e| ConfigError::InvalidValue {
            name: "ENGINE_ORDER".to_string(),
            message: e.to_string(),
        })?;
        if order > MAX_MIN_DEGREE {
            return Err(ConfigError::InvalidValue {
                name: "ENGINE_ORDER".to_string(),
                message: format!("must be at most {MAX_MIN_DEGREE} for the disk tree"),
            });
        }

        let key_space = load_number(&lookup, "ENGINE_KEY_SPACE", Self::DEFAULT_KEY_SPACE)?;
        if key_space == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ENGINE_KEY_SPACE".to_string(),
                message: "must not be zero".to_string(),
            });
        }

        let data_directory = match lookup("ENGINE_DATA_DIRECTORY") {
            Some(value) if value.is_empty() => {
                return Err(ConfigError::InvalidValue {
                    name: "ENGINE_DATA_DIRECTORY".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            Some(value) => PathBuf::from(value),
            None => PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
        };

        Ok(Self {
            order,
            seed: load_number(&lookup, "ENGINE_SEED", Self::DEFAULT_SEED)?,
            operations: load_number(&lookup, "ENGINE_OPERATIONS", Self::DEFAULT_OPERATIONS)?,
            key_space,
            data_directory,
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset.
fn load_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a valid non-negative integer"),
        }),
        None => Ok(default),
    }
}
