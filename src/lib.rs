//! Sensor siting: placement of leak-monitoring sensors in a 3-D subsurface grid
//!
//! Chooses where to drill wells and which sensors to put in them so that a
//! leak is detected as early as possible across many simulated leakage
//! scenarios, under a budget, a well cap and well spacing rules.
//!
//! ## Architecture
//!
//! - **Grid**: node indexing, coordinates and neighborhoods
//! - **Sensors**: trigger rules, per-type settings with a cached cloud of valid nodes
//! - **Inference**: the rule deciding when enough sensors fired
//! - **Placement**: candidates, wells, the constraint query and the mutation engine
//! - **Detection**: time-to-detection scoring of a candidate
//!
//! The outer search driver (annealing schedule, acceptance) is not part of
//! this crate; it calls [`ExtendedConfiguration::mutate_sensor`] or
//! [`ExtendedConfiguration::mutate_well`] once per step and scores the result.

pub mod config;
pub mod data;
pub mod detection;
pub mod error;
pub mod grid;
pub mod inference;
pub mod placement;
pub mod seeding;
pub mod sensors;
pub mod types;

pub use config::{ConfigError, RunConfig};
pub use data::{FieldDataSource, InMemoryFieldData};
pub use error::{GridError, SitingError};
pub use grid::{Column, Ijk, NodeId, NodeStructure, Xyz};
pub use inference::{InferenceResult, InferenceTest};
pub use placement::{
    Configuration, Constraints, ExtendedConfiguration, ModelOption, MutationOutcome, NodeQuery,
    ScenarioSet, TtdAggregation, Well, WellKind,
};
pub use sensors::{ExtendedSensor, Sensor, SensorSetting, Trigger, TriggerRule, UserSettings};
pub use types::{Scenario, TimeStep, SENTINEL_TTD};
