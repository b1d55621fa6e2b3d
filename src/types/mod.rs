//! Shared value types used across the siting core.

mod scenario;

pub use scenario::{Scenario, TimeStep};

/// Time to detection reported for a scenario that no configuration detects.
///
/// Optimizers treat it as the worst possible outcome, never as missing data.
pub const SENTINEL_TTD: f64 = 1_000_000.0;
