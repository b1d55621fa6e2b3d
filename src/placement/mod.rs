//! Placement: candidates, the constraint query, and the mutation engine.
//!
//! ## Usage
//!
//! ```ignore
//! let mut config = ExtendedConfiguration::new();
//! let outcome = config.mutate_sensor(&set, ModelOption::IndividualSensors, &mut rng);
//! if outcome.succeeded() {
//!     detection::score_configuration(&mut config, &set, true);
//! }
//! ```

mod configuration;
mod mutation;
mod scenario_set;
mod well;

pub use configuration::{Configuration, ExtendedConfiguration};
pub use mutation::{ModelOption, MutationOutcome, NEIGHBOR_BIAS};
pub use scenario_set::{Constraints, NodeQuery, ScenarioSet, TtdAggregation};
pub use well::{derive_wells, Well, WellKind};
