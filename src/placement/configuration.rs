//! Candidate solutions.
//!
//! [`ExtendedConfiguration`] is the mutable candidate a search worker owns:
//! a sensor arena, the wells derived from it, and the per-scenario results of
//! the last evaluation. [`Configuration`] is a frozen snapshot used to
//! compare and report solutions.

use super::scenario_set::{ScenarioSet, TtdAggregation};
use super::well::{derive_wells, Well};
use crate::grid::{Column, NodeId, NodeStructure};
use crate::inference::InferenceResult;
use crate::sensors::{ExtendedSensor, Sensor};
use crate::types::{Scenario, SENTINEL_TTD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

// ============================================================================
// Configuration
// ============================================================================

/// An immutable bag of sensors. Two configurations are equal when they hold
/// the same `(type, node)` pairs with the same multiplicities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    sensors: Vec<Sensor>,
}

impl Configuration {
    pub fn new(mut sensors: Vec<Sensor>) -> Self {
        sensors.sort();
        Self { sensors }
    }

    /// Sensors ordered by type, then node.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl From<&ExtendedConfiguration> for Configuration {
    fn from(config: &ExtendedConfiguration) -> Self {
        Self::new(config.sensors.iter().map(|s| s.sensor.clone()).collect())
    }
}

// ============================================================================
// Extended Configuration
// ============================================================================

/// The candidate under search.
///
/// Invariant: `wells` always partitions `sensors` by column. Every method
/// that touches the sensor list ends by rebuilding the wells.
#[derive(Debug, Clone, Default)]
pub struct ExtendedConfiguration {
    pub(super) sensors: Vec<ExtendedSensor>,
    wells: Vec<Well>,
    pub(super) realized: BTreeSet<Column>,
    times_to_detection: BTreeMap<Scenario, f64>,
    objective_values: BTreeMap<Scenario, f64>,
    inference_results: BTreeMap<Scenario, InferenceResult>,
}

impl ExtendedConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sensors(&self) -> &[ExtendedSensor] {
        &self.sensors
    }

    pub fn wells(&self) -> &[Well] {
        &self.wells
    }

    pub fn realized_columns(&self) -> &BTreeSet<Column> {
        &self.realized
    }

    /// Deep copy for branching the search.
    pub fn make_copy(&self) -> Self {
        self.clone()
    }

    /// Replace this candidate's sensors with those of `other`, dropping results.
    pub fn match_configuration(&mut self, other: &Self) {
        self.sensors.clone_from(&other.sensors);
        self.realized.clone_from(&other.realized);
        self.clear_evaluation();
        self.rebuild_wells();
    }

    pub(super) fn rebuild_wells(&mut self) {
        self.realized
            .retain(|c| self.sensors.iter().any(|s| s.column() == *c));
        self.wells = derive_wells(&self.sensors, &self.realized);
        for s in &mut self.sensors {
            s.state.well = None;
        }
        for (index, well) in self.wells.iter().enumerate() {
            for &m in well.members() {
                self.sensors[m].state.well = Some(index);
            }
        }
    }

    /// Copy of this candidate without the listed sensors.
    pub(super) fn without(&self, indices: &[usize]) -> Self {
        let mut view = Self {
            sensors: self
                .sensors
                .iter()
                .enumerate()
                .filter(|(i, _)| !indices.contains(i))
                .map(|(_, s)| s.clone())
                .collect(),
            wells: Vec::new(),
            realized: self.realized.clone(),
            ..Self::default()
        };
        view.rebuild_wells();
        view
    }

    // ========================================================================
    // Sensor list
    // ========================================================================

    /// Add a sensor unless an equal `(type, node)` sensor is already present.
    pub fn add_sensor(&mut self, sensor: ExtendedSensor) -> bool {
        if self.sensors.iter().any(|s| s.sensor == sensor.sensor) {
            return false;
        }
        self.sensors.push(sensor);
        self.rebuild_wells();
        true
    }

    pub fn remove_sensor(&mut self, index: usize) -> Option<ExtendedSensor> {
        if index >= self.sensors.len() {
            return None;
        }
        let removed = self.sensors.remove(index);
        self.rebuild_wells();
        Some(removed)
    }

    /// Remove a uniformly chosen sensor.
    pub fn remove_random_sensor<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<ExtendedSensor> {
        if self.sensors.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.sensors.len());
        self.remove_sensor(index)
    }

    /// Nodes holding a sensor of `sensor_type`.
    pub fn sensor_positions(&self, sensor_type: &str) -> BTreeSet<NodeId> {
        self.sensors
            .iter()
            .filter(|s| s.sensor_type() == sensor_type)
            .map(ExtendedSensor::node)
            .collect()
    }

    pub fn sensor_count_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.sensors {
            *counts.entry(s.sensor_type().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_wells(&self) -> usize {
        self.wells.len()
    }

    /// Sort sensors by type, then node.
    pub fn order_sensors(&mut self) {
        self.sensors.sort_by(|a, b| a.sensor.cmp(&b.sensor));
        self.rebuild_wells();
    }

    /// Position-by-position comparison of the sensor lists.
    pub fn matches(&self, other: &Self) -> bool {
        self.sensors.len() == other.sensors.len()
            && self
                .sensors
                .iter()
                .zip(&other.sensors)
                .all(|(a, b)| a.sensor == b.sensor)
    }

    /// Sensors that sit outside their type's cloud or share their node with
    /// another sensor of the same type.
    pub fn out_of_bounds_sensors(&self, set: &ScenarioSet) -> Vec<usize> {
        self.sensors
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                !set.in_cloud(s.sensor_type(), s.node())
                    || self
                        .sensors
                        .iter()
                        .enumerate()
                        .any(|(j, o)| j != *i && o.sensor == s.sensor)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Summed sensor cost, the figure bounded by the budget.
    pub fn cost(&self, set: &ScenarioSet) -> f64 {
        set.configuration_cost(self)
    }

    /// Human-readable well count and sensor positions.
    pub fn summary(&self, grid: &NodeStructure) -> String {
        let mut out = format!("{} wells", self.wells.len());
        for well in &self.wells {
            let _ = write!(out, " {}:[", well.column());
            for (n, s) in well.member_sensors(&self.sensors).enumerate() {
                if n > 0 {
                    out.push_str(", ");
                }
                let z = grid.xyz_center(s.sensor.ijk).z;
                let _ = write!(out, "{} k={} z={z:.2}", s.sensor_type(), s.sensor.ijk.k);
            }
            out.push(']');
        }
        out
    }

    // ========================================================================
    // Evaluation results
    // ========================================================================

    /// Drop every recorded result and every sensor's evaluation state.
    pub fn clear_evaluation(&mut self) {
        self.times_to_detection.clear();
        self.objective_values.clear();
        self.inference_results.clear();
        for s in &mut self.sensors {
            s.clear_evaluation();
        }
    }

    pub fn record_detection_time(&mut self, scenario: &Scenario, time: f64) {
        self.times_to_detection.insert(scenario.clone(), time);
    }

    pub fn record_objective_value(&mut self, scenario: &Scenario, value: f64) {
        self.objective_values.insert(scenario.clone(), value);
    }

    pub fn record_inference_result(&mut self, scenario: &Scenario, result: InferenceResult) {
        self.inference_results.insert(scenario.clone(), result);
    }

    pub const fn times_to_detection(&self) -> &BTreeMap<Scenario, f64> {
        &self.times_to_detection
    }

    pub const fn objective_values(&self) -> &BTreeMap<Scenario, f64> {
        &self.objective_values
    }

    pub const fn inference_results(&self) -> &BTreeMap<Scenario, InferenceResult> {
        &self.inference_results
    }

    pub(crate) fn sensors_mut(&mut self) -> &mut [ExtendedSensor] {
        &mut self.sensors
    }

    /// Sum of the recorded objective values.
    pub fn objective_value(&self) -> f64 {
        self.objective_values.values().sum()
    }

    /// Aggregate time to detection, per the set's aggregation policy.
    /// Returns [`SENTINEL_TTD`] when nothing was detected.
    pub fn time_to_detection(&self, set: &ScenarioSet) -> f64 {
        match set.ttd_aggregation() {
            TtdAggregation::AverageDetecting => self.normalized_average_ttd(set),
            TtdAggregation::WorstCase => self
                .times_to_detection
                .values()
                .copied()
                .reduce(f64::max)
                .unwrap_or(SENTINEL_TTD),
        }
    }

    /// Weighted mean detection time over the scenarios that were detected.
    pub fn normalized_average_ttd(&self, set: &ScenarioSet) -> f64 {
        let (weighted, weight) = self
            .times_to_detection
            .iter()
            .filter(|(_, &t)| t < SENTINEL_TTD)
            .fold((0.0, 0.0), |(sum, w), (s, &t)| {
                let sw = set.weight(s);
                (t.mul_add(sw, sum), w + sw)
            });
        if weight > 0.0 {
            weighted / weight
        } else {
            SENTINEL_TTD
        }
    }

    /// Weighted percentage of the set's scenarios that were detected.
    pub fn percent_scenarios_detected(&self, set: &ScenarioSet) -> f64 {
        let total = set.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let detected: f64 = self
            .times_to_detection
            .iter()
            .filter(|(_, &t)| t < SENTINEL_TTD)
            .map(|(s, _)| set.weight(s))
            .sum();
        100.0 * detected / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Ijk, Xyz};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_grid() -> NodeStructure {
        NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[1.0; 3],
            &[1.0; 3],
            &[1.0; 2],
            Vec::new(),
        )
        .unwrap()
    }

    fn sensor(grid: &NodeStructure, t: &str, ijk: Ijk) -> ExtendedSensor {
        ExtendedSensor::new(t, grid.node_id(ijk), grid)
    }

    fn assert_partition(config: &ExtendedConfiguration) {
        let mut seen = vec![0usize; config.sensors().len()];
        for (w, well) in config.wells().iter().enumerate() {
            for &m in well.members() {
                seen[m] += 1;
                assert_eq!(config.sensors()[m].column(), well.column());
                assert_eq!(config.sensors()[m].well(), Some(w));
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "wells do not partition sensors: {seen:?}");
    }

    #[test]
    fn test_add_and_remove_keep_wells_in_sync() {
        let grid = make_grid();
        let mut config = ExtendedConfiguration::new();
        assert!(config.add_sensor(sensor(&grid, "a", Ijk::new(1, 1, 1))));
        assert!(config.add_sensor(sensor(&grid, "b", Ijk::new(1, 1, 1))));
        assert!(config.add_sensor(sensor(&grid, "a", Ijk::new(2, 3, 2))));
        assert!(!config.add_sensor(sensor(&grid, "a", Ijk::new(1, 1, 1))), "duplicate rejected");
        assert_eq!(config.count_wells(), 2);
        assert_partition(&config);

        config.remove_sensor(0);
        assert_eq!(config.count_wells(), 2);
        assert_partition(&config);

        let mut rng = StdRng::seed_from_u64(3);
        config.remove_random_sensor(&mut rng);
        config.remove_random_sensor(&mut rng);
        assert!(config.remove_random_sensor(&mut rng).is_none());
        assert!(config.wells().is_empty());
    }

    #[test]
    fn test_snapshot_equality_is_a_multiset() {
        let grid = make_grid();
        let mut one = ExtendedConfiguration::new();
        one.add_sensor(sensor(&grid, "b", Ijk::new(1, 1, 1)));
        one.add_sensor(sensor(&grid, "a", Ijk::new(2, 1, 1)));
        let mut two = ExtendedConfiguration::new();
        two.add_sensor(sensor(&grid, "a", Ijk::new(2, 1, 1)));
        two.add_sensor(sensor(&grid, "b", Ijk::new(1, 1, 1)));

        assert!(!one.matches(&two), "ordered comparison sees different lists");
        assert_eq!(Configuration::from(&one), Configuration::from(&two));
        one.order_sensors();
        two.order_sensors();
        assert!(one.matches(&two));
        assert_eq!(one.sensors()[0].sensor_type(), "a");
        assert_partition(&one);
    }

    #[test]
    fn test_match_configuration_copies_sensors_and_drops_results() {
        let grid = make_grid();
        let mut source = ExtendedConfiguration::new();
        source.add_sensor(sensor(&grid, "a", Ijk::new(3, 3, 2)));
        let mut target = ExtendedConfiguration::new();
        target.record_detection_time(&Scenario::new("s"), 4.0);
        target.match_configuration(&source);
        assert!(target.matches(&source));
        assert!(target.times_to_detection().is_empty());
        assert_partition(&target);

        let copy = source.make_copy();
        assert!(copy.matches(&source));
    }

    #[test]
    fn test_summary_lists_wells() {
        let grid = make_grid();
        let mut config = ExtendedConfiguration::new();
        config.add_sensor(sensor(&grid, "a", Ijk::new(1, 2, 2)));
        let summary = config.summary(&grid);
        assert!(summary.starts_with("1 wells"), "{summary}");
        assert!(summary.contains("a k=2"), "{summary}");
    }
}
