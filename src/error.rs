//! Error types for grid construction and run-context setup.
//!
//! Infeasible searches never surface here: an empty candidate set or a failed
//! mutation is reported through return values, not errors.

use thiserror::Error;

/// Faults raised while building a [`crate::grid::NodeStructure`].
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Axis {axis} has no cells")]
    EmptyAxis { axis: char },

    #[error("Axis {axis} is not strictly increasing at index {index}")]
    NotIncreasing { axis: char, index: usize },

    #[error("Axis {axis} has a non-finite coordinate at index {index}")]
    NonFinite { axis: char, index: usize },

    #[error("Cell ({i}, {j}, {k}) is outside a {i_max}x{j_max}x{k_max} grid")]
    OutOfBounds {
        i: usize,
        j: usize,
        k: usize,
        i_max: usize,
        j_max: usize,
        k_max: usize,
    },
}

/// Faults raised while assembling or reconfiguring a scenario set.
#[derive(Debug, Error)]
pub enum SitingError {
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Scenario set has no scenarios")]
    NoScenarios,

    #[error("Scenario set has no sensor types")]
    NoSensorTypes,

    #[error("Add point rejected: {0}")]
    InvalidAddPoint(#[from] GridError),

    #[error("Scenario weight for {scenario} must be finite and non-negative (got {weight})")]
    InvalidWeight { scenario: String, weight: f64 },
}
