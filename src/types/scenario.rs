//! Scenario and time-step value objects.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One simulated leakage realization, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario(String);

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scenario {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A sampled instant of the simulation output.
///
/// Identity and ordering use only `index`; `real_time` is the simulated time
/// (in years) reported as time to detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeStep {
    pub index: usize,
    pub real_time: f64,
}

impl TimeStep {
    pub const fn new(index: usize, real_time: f64) -> Self {
        Self { index, real_time }
    }
}

impl PartialEq for TimeStep {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for TimeStep {}

impl PartialOrd for TimeStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl std::hash::Hash for TimeStep {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{} ({:.3})", self.index, self.real_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_scenarios_order_by_name() {
        let set: BTreeSet<Scenario> = ["s10", "s02", "s01"].into_iter().map(Scenario::from).collect();
        let names: Vec<&str> = set.iter().map(Scenario::name).collect();
        assert_eq!(names, vec!["s01", "s02", "s10"]);
        assert_eq!(Scenario::new("a"), Scenario::from("a"));
    }

    #[test]
    fn test_time_step_identity_ignores_real_time() {
        let a = TimeStep::new(3, 10.0);
        let b = TimeStep::new(3, 12.5);
        let c = TimeStep::new(4, 1.0);
        assert_eq!(a, b);
        assert!(a < c, "ordering is by index, not real time");
    }
}
