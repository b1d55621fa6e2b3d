//! Scenario Set: the run-wide context and its constraint query
//!
//! A `ScenarioSet` owns everything shared by the candidates of one
//! optimization run: the grid, the scenarios and their weights, one
//! [`SensorSetting`] per sensor type, the [`InferenceTest`], the hard
//! placement constraints, and the data source the clouds are computed from.
//!
//! [`ScenarioSet::valid_nodes`] is the single answer to "where can a sensor
//! of this type legally go right now", and every mutation goes through it.

use super::configuration::ExtendedConfiguration;
use crate::config::RunConfig;
use crate::data::FieldDataSource;
use crate::error::SitingError;
use crate::grid::{Column, Ijk, NodeId, NodeStructure};
use crate::inference::InferenceTest;
use crate::sensors::{SensorSetting, UserSettings};
use crate::types::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Constraints
// ============================================================================

/// Hard limits every candidate must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Preferred node for newly added sensors and realized wells.
    pub add_point: Ijk,
    pub max_wells: usize,
    /// Budget for the summed sensor cost of a configuration.
    pub cost_ceiling: f64,
    /// Columns this close to an existing well are rejected.
    pub exclusion_radius: f64,
    /// Columns this far from an existing well are rejected.
    pub inclusion_radius: f64,
    pub allow_multiple_sensors_in_well: bool,
    /// Restrict candidates to the boundary of each cloud.
    pub edge_moves_only: bool,
    /// Fixed installation cost per well.
    pub well_cost: f64,
    /// Installation cost per unit of well depth.
    pub well_depth_cost: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            add_point: Ijk::new(1, 1, 1),
            max_wells: 10,
            cost_ceiling: 300.0,
            exclusion_radius: 0.0,
            inclusion_radius: f64::MAX,
            allow_multiple_sensors_in_well: true,
            edge_moves_only: false,
            well_cost: 0.0,
            well_depth_cost: 0.0,
        }
    }
}

/// How per-scenario detection times are reduced to one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtdAggregation {
    /// Weighted average over the scenarios that were detected.
    #[default]
    AverageDetecting,
    /// The slowest scenario, undetected ones counting as the sentinel.
    WorstCase,
}

/// Flags of a [`ScenarioSet::valid_nodes`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeQuery {
    /// Set by callers placing at the add point. The add point is never
    /// exempted from the other filters.
    pub with_add_point: bool,
    /// Reject everything when one more sensor of the type is unaffordable.
    pub apply_cost: bool,
    /// Respect the maximum well count.
    pub well_constraint: bool,
}

impl NodeQuery {
    /// Query used when adding a sensor: every constraint applies.
    pub const ADD: Self = Self {
        with_add_point: true,
        apply_cost: true,
        well_constraint: true,
    };

    /// Query used when relocating existing sensors: no budget check.
    pub const RELOCATE: Self = Self {
        with_add_point: false,
        apply_cost: false,
        well_constraint: false,
    };

    pub const fn new(with_add_point: bool, apply_cost: bool, well_constraint: bool) -> Self {
        Self {
            with_add_point,
            apply_cost,
            well_constraint,
        }
    }
}

// ============================================================================
// Scenario Set
// ============================================================================

pub struct ScenarioSet {
    grid: NodeStructure,
    scenarios: Vec<Scenario>,
    weights: BTreeMap<Scenario, f64>,
    settings: BTreeMap<String, SensorSetting>,
    inference: InferenceTest,
    constraints: Constraints,
    ttd_aggregation: TtdAggregation,
    source: Arc<dyn FieldDataSource>,
}

impl fmt::Debug for ScenarioSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioSet")
            .field("dims", &self.grid.dims())
            .field("scenarios", &self.scenarios)
            .field("sensor_types", &self.settings.keys().collect::<Vec<_>>())
            .field("constraints", &self.constraints)
            .field("ttd_aggregation", &self.ttd_aggregation)
            .finish_non_exhaustive()
    }
}

impl ScenarioSet {
    /// Build the run context. Every scenario starts with weight 1 and every
    /// sensor type with default settings.
    pub fn new<S: AsRef<str>>(
        grid: NodeStructure,
        scenarios: Vec<Scenario>,
        sensor_types: &[S],
        source: Arc<dyn FieldDataSource>,
    ) -> Result<Self, SitingError> {
        if scenarios.is_empty() {
            return Err(SitingError::NoScenarios);
        }
        if sensor_types.is_empty() {
            return Err(SitingError::NoSensorTypes);
        }
        let mut scenarios = scenarios;
        scenarios.sort();
        scenarios.dedup();

        let settings: BTreeMap<String, SensorSetting> = sensor_types
            .iter()
            .map(|t| {
                let t = t.as_ref();
                (t.to_string(), SensorSetting::new(t, &grid, source.as_ref()))
            })
            .collect();
        let weights = scenarios.iter().map(|s| (s.clone(), 1.0)).collect();
        let inference = InferenceTest::new(settings.keys().cloned());

        info!(
            dims = %grid.dims(),
            scenarios = scenarios.len(),
            sensor_types = settings.len(),
            "Scenario set created"
        );
        Ok(Self {
            grid,
            scenarios,
            weights,
            settings,
            inference,
            constraints: Constraints::default(),
            ttd_aggregation: TtdAggregation::default(),
            source,
        })
    }

    pub const fn grid(&self) -> &NodeStructure {
        &self.grid
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn source(&self) -> &dyn FieldDataSource {
        self.source.as_ref()
    }

    /// Sensor types in sorted order.
    pub fn sensor_types(&self) -> impl Iterator<Item = &str> {
        self.settings.keys().map(String::as_str)
    }

    pub fn setting(&self, sensor_type: &str) -> Option<&SensorSetting> {
        self.settings.get(sensor_type)
    }

    pub fn setting_mut(&mut self, sensor_type: &str) -> Result<&mut SensorSetting, SitingError> {
        self.settings
            .get_mut(sensor_type)
            .ok_or_else(|| SitingError::UnknownSensorType(sensor_type.to_string()))
    }

    /// Apply user edits to one type; returns whether its cloud went stale.
    pub fn apply_user_settings(
        &mut self,
        sensor_type: &str,
        settings: &UserSettings,
    ) -> Result<bool, SitingError> {
        Ok(self.setting_mut(sensor_type)?.apply_user_settings(settings))
    }

    pub const fn inference_test(&self) -> &InferenceTest {
        &self.inference
    }

    pub fn inference_test_mut(&mut self) -> &mut InferenceTest {
        &mut self.inference
    }

    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Replace the constraints. The add point must lie inside the grid.
    pub fn set_constraints(&mut self, constraints: Constraints) -> Result<(), SitingError> {
        self.grid.try_node_id(constraints.add_point)?;
        debug!(?constraints, "Scenario set constraints updated");
        self.constraints = constraints;
        Ok(())
    }

    pub fn add_point_node(&self) -> NodeId {
        self.grid.node_id(self.constraints.add_point)
    }

    pub const fn ttd_aggregation(&self) -> TtdAggregation {
        self.ttd_aggregation
    }

    pub fn set_ttd_aggregation(&mut self, aggregation: TtdAggregation) {
        self.ttd_aggregation = aggregation;
    }

    // ========================================================================
    // Scenario weights
    // ========================================================================

    pub fn weight(&self, scenario: &Scenario) -> f64 {
        self.weights.get(scenario).copied().unwrap_or(0.0)
    }

    pub fn set_weight(&mut self, scenario: &Scenario, weight: f64) -> Result<(), SitingError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SitingError::InvalidWeight {
                scenario: scenario.to_string(),
                weight,
            });
        }
        let slot = self
            .weights
            .get_mut(scenario)
            .ok_or_else(|| SitingError::UnknownScenario(scenario.to_string()))?;
        *slot = weight;
        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// A scenario's weight as a fraction of all scenario weights.
    pub fn normalized_weight(&self, scenario: &Scenario) -> f64 {
        let total = self.total_weight();
        if total > 0.0 {
            self.weight(scenario) / total
        } else {
            0.0
        }
    }

    // ========================================================================
    // Clouds and costs
    // ========================================================================

    /// Current cloud of a type; empty for an unknown type.
    pub fn cloud(&self, sensor_type: &str) -> Arc<BTreeSet<NodeId>> {
        self.settings.get(sensor_type).map_or_else(Arc::default, |s| {
            s.valid_nodes(&self.grid, &self.scenarios, self.source.as_ref())
        })
    }

    /// Cloud of a type before Pareto pruning.
    pub fn full_cloud(&self, sensor_type: &str) -> Arc<BTreeSet<NodeId>> {
        self.settings.get(sensor_type).map_or_else(Arc::default, |s| {
            s.full_cloud(&self.grid, &self.scenarios, self.source.as_ref())
        })
    }

    pub fn in_cloud(&self, sensor_type: &str, node: NodeId) -> bool {
        self.cloud(sensor_type).contains(&node)
    }

    /// Columns holding at least one cloud node of any type.
    pub fn cloud_columns(&self) -> BTreeSet<Column> {
        self.sensor_types()
            .flat_map(|t| {
                self.cloud(t)
                    .iter()
                    .map(|&n| self.grid.ijk(n).column())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Cost of one sensor of the type; unknown types cost nothing.
    pub fn sensor_cost(&self, sensor_type: &str) -> f64 {
        self.settings.get(sensor_type).map_or(0.0, SensorSetting::cost)
    }

    /// Summed sensor cost of a configuration; this is what the budget bounds.
    pub fn configuration_cost(&self, configuration: &ExtendedConfiguration) -> f64 {
        configuration
            .sensors()
            .iter()
            .map(|s| self.sensor_cost(s.sensor_type()))
            .sum()
    }

    /// Cost of drilling the wells of a configuration: a fixed cost per well
    /// plus the depth cost down to the lower edge of its deepest sensor.
    pub fn installation_cost(&self, configuration: &ExtendedConfiguration) -> f64 {
        let mut deepest: BTreeMap<Column, usize> = BTreeMap::new();
        for sensor in configuration.sensors() {
            let ijk = sensor.sensor.ijk;
            deepest
                .entry(ijk.column())
                .and_modify(|k| *k = (*k).min(ijk.k))
                .or_insert(ijk.k);
        }
        let top = self.grid.z_range().1.max(0.0);
        deepest
            .iter()
            .map(|(column, &k)| {
                let bottom = self.grid.xyz_edge(column.at(k)).map_or(top, |e| e.z);
                (top - bottom).mul_add(self.constraints.well_depth_cost, self.constraints.well_cost)
            })
            .sum()
    }

    /// Cheapest single well able to satisfy the inference test: the fixed
    /// well cost plus [`InferenceTest::min_sensor_cost`]. Depth cost is left
    /// out, since it depends on where the sensors sit.
    pub fn min_well_cost(&self) -> f64 {
        self.constraints.well_cost + self.inference.min_sensor_cost(|t| self.sensor_cost(t))
    }

    /// Distinct columns occupied by a configuration's sensors.
    pub fn count_wells(&self, configuration: &ExtendedConfiguration) -> usize {
        configuration
            .sensors()
            .iter()
            .map(|s| s.column())
            .collect::<BTreeSet<_>>()
            .len()
    }

    // ========================================================================
    // Constraint query
    // ========================================================================

    /// Nodes where a sensor of `sensor_type` may be placed in `configuration`.
    ///
    /// Filters, in order: budget, cloud, cloud boundary (edge-only mode),
    /// same-type occupancy, well cap, well spacing.
    pub fn valid_nodes(
        &self,
        sensor_type: &str,
        configuration: &ExtendedConfiguration,
        query: NodeQuery,
    ) -> BTreeSet<NodeId> {
        let Some(setting) = self.settings.get(sensor_type) else {
            return BTreeSet::new();
        };

        if query.apply_cost
            && self.configuration_cost(configuration) + setting.cost() > self.constraints.cost_ceiling
        {
            return BTreeSet::new();
        }

        let cloud = self.cloud(sensor_type);
        let occupied = configuration.sensor_positions(sensor_type);
        let wells = configuration.wells();
        let well_columns: BTreeSet<Column> = wells.iter().map(|w| w.column()).collect();
        let can_open_well = wells.len() < self.constraints.max_wells;

        let mut spacing: BTreeMap<Column, bool> = BTreeMap::new();
        cloud
            .iter()
            .copied()
            .filter(|&node| !self.constraints.edge_moves_only || self.on_cloud_edge(node, &cloud))
            .filter(|node| !occupied.contains(node))
            .filter(|&node| {
                !query.well_constraint
                    || can_open_well
                    || well_columns.contains(&self.grid.ijk(node).column())
            })
            .filter(|&node| {
                let column = self.grid.ijk(node).column();
                *spacing
                    .entry(column)
                    .or_insert_with(|| self.spacing_allows(column, Some(sensor_type), configuration))
            })
            .collect()
    }

    /// A node is on the cloud edge unless every one of its neighbors is in the cloud.
    fn on_cloud_edge(&self, node: NodeId, cloud: &BTreeSet<NodeId>) -> bool {
        let neighbors = self.grid.neighbors(self.grid.ijk(node));
        neighbors.is_empty() || !neighbors.iter().all(|n| cloud.contains(n))
    }

    /// Exclusion/inclusion radius check of one column against every well.
    ///
    /// A column at distance `<= exclusion_radius` or `>= inclusion_radius`
    /// from a well is rejected, except the well's own column: that one is
    /// kept when multiple sensors per well are allowed, or when the well has
    /// no sensor of `sensor_type` yet.
    pub fn spacing_allows(
        &self,
        column: Column,
        sensor_type: Option<&str>,
        configuration: &ExtendedConfiguration,
    ) -> bool {
        let c = &self.constraints;
        configuration.wells().iter().all(|well| {
            let distance = self.grid.column_distance(well.column(), column);
            if distance > c.exclusion_radius && distance < c.inclusion_radius {
                return true;
            }
            if well.column() != column {
                return false;
            }
            if c.allow_multiple_sensors_in_well {
                return true;
            }
            sensor_type.map_or(true, |t| !well.has_type(configuration.sensors(), t))
        })
    }

    /// Types a sensor of `current_type` could become without breaking the budget.
    pub fn valid_switch_types(
        &self,
        current_type: &str,
        configuration: &ExtendedConfiguration,
    ) -> Vec<String> {
        let base = self.configuration_cost(configuration) - self.sensor_cost(current_type);
        self.settings
            .iter()
            .filter(|(_, s)| base + s.cost() <= self.constraints.cost_ceiling)
            .map(|(t, _)| t.clone())
            .collect()
    }

    // ========================================================================
    // Run configuration
    // ========================================================================

    /// Push a loaded [`RunConfig`] into this set: sensor overrides, inference
    /// minimums, scenario weights, constraints and the TTD aggregation.
    ///
    /// Every sensor type and scenario named by the config must exist. Nothing
    /// is applied unless all of them do.
    pub fn apply_run_config(&mut self, config: &RunConfig) -> Result<(), SitingError> {
        let unknown_type = config
            .sensors
            .keys()
            .chain(config.inference.per_type.keys())
            .find(|t| !self.settings.contains_key(t.as_str()));
        if let Some(t) = unknown_type {
            return Err(SitingError::UnknownSensorType(t.clone()));
        }
        if let Some(name) = config
            .scenarios
            .weights
            .keys()
            .find(|n| !self.weights.contains_key(&Scenario::new(n.as_str())))
        {
            return Err(SitingError::UnknownScenario(name.clone()));
        }
        let constraints = config.constraints.to_constraints();
        self.grid.try_node_id(constraints.add_point)?;

        for (name, &weight) in &config.scenarios.weights {
            self.set_weight(&Scenario::new(name.as_str()), weight)?;
        }
        let mut stale = 0;
        for (sensor_type, section) in &config.sensors {
            let setting = self.setting_mut(sensor_type)?;
            let merged = section.merge_into(setting.user_settings());
            if setting.apply_user_settings(&merged) {
                stale += 1;
            }
        }
        for (sensor_type, &minimum) in &config.inference.per_type {
            self.inference.set_minimum_for_type(sensor_type.as_str(), minimum);
        }
        self.inference.set_overall_minimum(config.inference.overall_minimum);
        self.set_constraints(constraints)?;
        self.ttd_aggregation = config.run.ttd_aggregation;

        info!(
            run = %config.run.name,
            stale_clouds = stale,
            inference = %self.inference,
            "Run config applied to scenario set"
        );
        Ok(())
    }
}
