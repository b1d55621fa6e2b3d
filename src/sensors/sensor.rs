//! Placed sensors and their per-run state.

use crate::grid::{Column, Ijk, NodeId, NodeStructure, Xyz};
use crate::types::{Scenario, TimeStep};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A sensor of one type at one node.
///
/// Identity is `(sensor_type, node)`; the index and coordinates are derived
/// from the node and carried for convenience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_type: String,
    pub node: NodeId,
    pub ijk: Ijk,
    pub xyz: Xyz,
}

impl Sensor {
    pub fn new(sensor_type: impl Into<String>, node: NodeId, grid: &NodeStructure) -> Self {
        let ijk = grid.ijk(node);
        Self {
            sensor_type: sensor_type.into(),
            node,
            ijk,
            xyz: grid.xyz_center(ijk),
        }
    }

    pub const fn column(&self) -> Column {
        self.ijk.column()
    }
}

impl PartialEq for Sensor {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.sensor_type == other.sensor_type
    }
}

impl Eq for Sensor {}

impl Hash for Sensor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sensor_type.hash(state);
        self.node.hash(state);
    }
}

impl PartialOrd for Sensor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sensors order by type, then node.
impl Ord for Sensor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sensor_type
            .cmp(&other.sensor_type)
            .then(self.node.cmp(&other.node))
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ node {} {}", self.sensor_type, self.node, self.ijk)
    }
}

/// Runtime state accumulated while a sensor sits at one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorState {
    /// Index of the owning well in the configuration's well list.
    pub well: Option<usize>,
    /// Per scenario evaluated: the first step at which the sensor fired, if any.
    pub history: BTreeMap<Scenario, Option<TimeStep>>,
    pub triggering: bool,
    /// Readings that caused the sensor to fire, per scenario.
    pub evidence: BTreeMap<Scenario, BTreeMap<TimeStep, f64>>,
}

/// A sensor plus the state that relocation clears.
#[derive(Debug, Clone)]
pub struct ExtendedSensor {
    pub sensor: Sensor,
    pub state: SensorState,
}

impl ExtendedSensor {
    pub fn new(sensor_type: impl Into<String>, node: NodeId, grid: &NodeStructure) -> Self {
        Self {
            sensor: Sensor::new(sensor_type, node, grid),
            state: SensorState::default(),
        }
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor.sensor_type
    }

    pub const fn node(&self) -> NodeId {
        self.sensor.node
    }

    pub const fn column(&self) -> Column {
        self.sensor.column()
    }

    pub const fn well(&self) -> Option<usize> {
        self.state.well
    }

    /// Move to `node`, dropping all accumulated state including the well link.
    pub fn relocate(&mut self, node: NodeId, grid: &NodeStructure) {
        let sensor_type = std::mem::take(&mut self.sensor.sensor_type);
        self.sensor = Sensor::new(sensor_type, node, grid);
        self.state = SensorState::default();
    }

    /// Change type and move in one step.
    pub fn retype_and_relocate(&mut self, sensor_type: &str, node: NodeId, grid: &NodeStructure) {
        self.sensor = Sensor::new(sensor_type, node, grid);
        self.state = SensorState::default();
    }

    /// Record one evaluated reading. A firing reading is kept as evidence.
    pub fn set_triggered(&mut self, triggered: bool, scenario: &Scenario, step: TimeStep, value: f64) {
        let first = self.state.history.entry(scenario.clone()).or_insert(None);
        if triggered {
            if first.is_none() {
                *first = Some(step);
            }
            self.state.triggering = true;
            self.state
                .evidence
                .entry(scenario.clone())
                .or_default()
                .insert(step, value);
        }
    }

    /// Has this sensor fired in `scenario` at or before `step`?
    pub fn triggered_by(&self, scenario: &Scenario, step: TimeStep) -> bool {
        self.state
            .history
            .get(scenario)
            .copied()
            .flatten()
            .is_some_and(|first| first <= step)
    }

    /// Drop evaluation results but keep the well link.
    pub fn clear_evaluation(&mut self) {
        self.state.history.clear();
        self.state.evidence.clear();
        self.state.triggering = false;
    }
}
