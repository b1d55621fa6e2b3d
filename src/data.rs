//! Field data access: the boundary to the simulation output loader.
//!
//! The siting core never reads simulation files itself. Everything it needs
//! from a loaded dataset goes through [`FieldDataSource`], which must be safe
//! to share across worker threads.
//!
//! [`InMemoryFieldData`] is a dense in-memory implementation, used by tests
//! and by the soak tool, which fills it with synthetic plumes.

use crate::grid::{Column, Ijk, NodeId, NodeStructure};
use crate::sensors::TriggerRule;
use crate::types::{Scenario, TimeStep};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Per-scenario field values, queried by sensor type.
pub trait FieldDataSource: Send + Sync {
    /// Value of a field at one node and time step, if the dataset has it.
    fn value_at(
        &self,
        scenario: &Scenario,
        sensor_type: &str,
        time_index: usize,
        node: NodeId,
    ) -> Option<f64>;

    /// Global minimum of a field across all scenarios.
    fn min_value(&self, sensor_type: &str) -> Option<f64>;

    /// Global maximum of a field across all scenarios.
    fn max_value(&self, sensor_type: &str) -> Option<f64>;

    /// First time step at which `rule` fires at `node`, if any.
    ///
    /// Delta rules compare against the node's value at the grid's first time step.
    fn first_trigger(
        &self,
        grid: &NodeStructure,
        scenario: &Scenario,
        sensor_type: &str,
        rule: &TriggerRule,
        node: NodeId,
    ) -> Option<TimeStep> {
        let steps = grid.time_steps();
        let initial = steps
            .first()
            .and_then(|s| self.value_at(scenario, sensor_type, s.index, node))?;
        steps.iter().copied().find(|step| {
            self.value_at(scenario, sensor_type, step.index, node)
                .is_some_and(|v| rule.fires(v, initial))
        })
    }

    /// Every node at which `rule` fires at some time step of `scenario`.
    fn valid_nodes_for_trigger(
        &self,
        grid: &NodeStructure,
        scenario: &Scenario,
        sensor_type: &str,
        rule: &TriggerRule,
    ) -> BTreeSet<NodeId> {
        grid.node_ids()
            .filter(|&node| {
                self.first_trigger(grid, scenario, sensor_type, rule, node)
                    .is_some()
            })
            .collect()
    }
}

// ============================================================================
// In-memory data
// ============================================================================

/// Dense `[time][node]` value tables keyed by scenario and sensor type.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFieldData {
    total_nodes: usize,
    fields: BTreeMap<(Scenario, String), Vec<Vec<f64>>>,
}

impl InMemoryFieldData {
    pub fn new(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            fields: BTreeMap::new(),
        }
    }

    /// Set one value, growing the time axis as needed. Unset cells read as missing.
    pub fn set_value(
        &mut self,
        scenario: &Scenario,
        sensor_type: &str,
        time_index: usize,
        node: NodeId,
        value: f64,
    ) {
        if node == 0 || node > self.total_nodes {
            return;
        }
        let total = self.total_nodes;
        let series = self
            .fields
            .entry((scenario.clone(), sensor_type.to_string()))
            .or_default();
        while series.len() <= time_index {
            series.push(vec![f64::NAN; total]);
        }
        series[time_index][node - 1] = value;
    }

    /// Set the same value at `node` for every time step in `steps`.
    pub fn set_constant(
        &mut self,
        scenario: &Scenario,
        sensor_type: &str,
        steps: &[TimeStep],
        node: NodeId,
        value: f64,
    ) {
        for step in steps {
            self.set_value(scenario, sensor_type, step.index, node, value);
        }
    }

    pub fn sensor_types(&self) -> BTreeSet<String> {
        self.fields.keys().map(|(_, t)| t.clone()).collect()
    }

    fn values_of<'a>(&'a self, sensor_type: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.fields
            .iter()
            .filter(move |((_, t), _)| t == sensor_type)
            .flat_map(|(_, series)| series.iter().flatten().copied())
            .filter(|v| v.is_finite())
    }

    /// Fill a dataset with Gaussian plumes spreading from a random source per scenario.
    ///
    /// Each sensor type sees the same plume scaled by its own amplitude, with
    /// `noise` standard deviation of additive measurement noise. Values start
    /// near zero at the first time step and grow as the plume spreads.
    pub fn synthetic_plumes(
        grid: &NodeStructure,
        scenarios: &[Scenario],
        sensor_types: &[(&str, f64)],
        noise: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Self::new(grid.total_nodes());
        let noise = Normal::new(0.0, noise.max(0.0)).ok();
        let dims = grid.dims();
        let steps = grid.time_steps().to_vec();
        let last_time = steps.last().map_or(1.0, |s| s.real_time.max(1.0));

        for scenario in scenarios {
            let source = Column::new(rng.gen_range(1..=dims.i), rng.gen_range(1..=dims.j))
                .at(rng.gen_range(1..=dims.k));
            let origin = grid.xyz_center(source);
            let reach = rng.gen_range(0.3..1.0);
            let extent = grid
                .xyz_center(Ijk::new(dims.i, dims.j, dims.k))
                .distance(&grid.xyz_center(Ijk::new(1, 1, 1)))
                .max(1.0);
            debug!(scenario = %scenario, source = %source, reach, "Synthetic plume source");

            for (sensor_type, amplitude) in sensor_types {
                for step in &steps {
                    let spread = (reach * extent * (step.real_time / last_time)).max(1e-6);
                    for node in grid.node_ids() {
                        let d = grid.xyz_center(grid.ijk(node)).distance(&origin);
                        let plume = if step.index == 0 {
                            0.0
                        } else {
                            amplitude * (-(d * d) / (2.0 * spread * spread)).exp()
                        };
                        let jitter = noise.map_or(0.0, |n| n.sample(&mut rng));
                        data.set_value(scenario, sensor_type, step.index, node, plume + jitter);
                    }
                }
            }
        }
        data
    }
}

impl FieldDataSource for InMemoryFieldData {
    fn value_at(
        &self,
        scenario: &Scenario,
        sensor_type: &str,
        time_index: usize,
        node: NodeId,
    ) -> Option<f64> {
        let series = self
            .fields
            .get(&(scenario.clone(), sensor_type.to_string()))?;
        let v = *series.get(time_index)?.get(node.checked_sub(1)?)?;
        v.is_finite().then_some(v)
    }

    fn min_value(&self, sensor_type: &str) -> Option<f64> {
        self.values_of(sensor_type).reduce(f64::min)
    }

    fn max_value(&self, sensor_type: &str) -> Option<f64> {
        self.values_of(sensor_type).reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Xyz;
    use crate::sensors::{DeltaType, Trigger};

    fn make_grid() -> NodeStructure {
        NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[1.0, 1.0],
            &[1.0],
            &[1.0],
            vec![TimeStep::new(0, 0.0), TimeStep::new(1, 1.0), TimeStep::new(2, 2.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_values_read_as_none() {
        let s = Scenario::new("s1");
        let mut data = InMemoryFieldData::new(2);
        data.set_value(&s, "co2", 1, 2, 4.0);
        assert_eq!(data.value_at(&s, "co2", 1, 2), Some(4.0));
        assert_eq!(data.value_at(&s, "co2", 0, 2), None);
        assert_eq!(data.value_at(&s, "co2", 1, 3), None);
        assert_eq!(data.value_at(&s, "brine", 1, 2), None);
        assert_eq!(data.max_value("co2"), Some(4.0));
    }

    #[test]
    fn test_first_trigger_uses_initial_value_for_deltas() {
        let grid = make_grid();
        let s = Scenario::new("s1");
        let mut data = InMemoryFieldData::new(2);
        for (t, v) in [(0, 10.0), (1, 10.5), (2, 13.0)] {
            data.set_value(&s, "p", t, 1, v);
            data.set_value(&s, "p", t, 2, 10.0);
        }
        let rule = TriggerRule {
            trigger: Trigger::AbsoluteDelta,
            delta_type: DeltaType::Increase,
            lower: 2.0,
            upper: 0.0,
        };
        let hit = data.first_trigger(&grid, &s, "p", &rule, 1).unwrap();
        assert_eq!(hit.index, 2);
        assert!(data.first_trigger(&grid, &s, "p", &rule, 2).is_none());
        let nodes = data.valid_nodes_for_trigger(&grid, &s, "p", &rule);
        assert_eq!(nodes.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_synthetic_plumes_are_reproducible() {
        let grid = make_grid();
        let scenarios = vec![Scenario::new("a"), Scenario::new("b")];
        let one = InMemoryFieldData::synthetic_plumes(&grid, &scenarios, &[("co2", 1.0)], 0.01, 7);
        let two = InMemoryFieldData::synthetic_plumes(&grid, &scenarios, &[("co2", 1.0)], 0.01, 7);
        for s in &scenarios {
            for node in grid.node_ids() {
                assert_eq!(one.value_at(s, "co2", 2, node), two.value_at(s, "co2", 2, node));
            }
        }
        assert_eq!(one.sensor_types().len(), 1);
    }
}
