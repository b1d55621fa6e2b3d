//! Run Configuration Module
//!
//! Search parameters, placement constraints, and per-type sensor settings
//! loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `SITING_CONFIG` environment variable (path to TOML file)
//! 2. `siting.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The config is a plain value handed to whoever needs it:
//!
//! ```ignore
//! let config = RunConfig::load();
//! set.apply_run_config(&config)?;
//! let rng = seeding::worker_rng(config.run.seed, worker);
//! ```

mod run_config;
pub mod validation;

pub use run_config::*;
