//! Mutation engine: the move generators one search step is built from.
//!
//! Each operator either applies one legal change to the candidate and
//! reports what it did, or leaves the candidate untouched. The two chains,
//! [`ExtendedConfiguration::mutate_sensor`] and
//! [`ExtendedConfiguration::mutate_well`], try their operators in priority
//! order and stop at the first success. A chain where nothing succeeds
//! returns [`MutationOutcome::NoLegalMove`].
//!
//! Every operator takes the worker's RNG explicitly, so a seeded worker
//! replays the same sequence of moves.

use super::configuration::ExtendedConfiguration;
use super::scenario_set::{NodeQuery, ScenarioSet};
use super::well::Well;
use crate::grid::{Column, NodeId};
use crate::sensors::ExtendedSensor;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Probability of trying an adjacent position before a random one.
pub const NEIGHBOR_BIAS: f64 = 0.8;

/// Which well operator a sensor step falls back to first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelOption {
    /// Adjust sensors inside their wells: shuffle a well, then move one.
    #[default]
    #[serde(rename = "individual_sensors")]
    IndividualSensors,
    /// Reposition wells: move a well, then shuffle one.
    #[serde(rename = "individual_sensors_2")]
    IndividualSensors2,
}

impl fmt::Display for ModelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndividualSensors => write!(f, "individual_sensors"),
            Self::IndividualSensors2 => write!(f, "individual_sensors_2"),
        }
    }
}

/// What a mutation chain did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationOutcome {
    AddedSensor { sensor: usize },
    MovedSensorInBounds { sensor: usize },
    MovedSensor { sensor: usize },
    ShuffledWell { column: Column },
    MovedWell { from: Column, to: Column },
    AddedRealizedWell { column: Column },
    MovedRealizedWellInBounds { from: Column, to: Column },
    MovedRealizedWell { from: Column, to: Column },
    NoLegalMove,
}

impl MutationOutcome {
    pub const fn succeeded(&self) -> bool {
        !matches!(self, Self::NoLegalMove)
    }

    /// Operator name, for tallies and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddedSensor { .. } => "added_sensor",
            Self::MovedSensorInBounds { .. } => "moved_sensor_in_bounds",
            Self::MovedSensor { .. } => "moved_sensor",
            Self::ShuffledWell { .. } => "shuffled_well",
            Self::MovedWell { .. } => "moved_well",
            Self::AddedRealizedWell { .. } => "added_realized_well",
            Self::MovedRealizedWellInBounds { .. } => "moved_realized_well_in_bounds",
            Self::MovedRealizedWell { .. } => "moved_realized_well",
            Self::NoLegalMove => "no_legal_move",
        }
    }
}

impl ExtendedConfiguration {
    // ========================================================================
    // Chains
    // ========================================================================

    /// One sensor-level search step: add, repair, move a sensor, then the
    /// well operators in the order `model` selects. Realized wells and their
    /// sensors are left alone; they belong to [`Self::mutate_well`].
    pub fn mutate_sensor<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        model: ModelOption,
        rng: &mut R,
    ) -> MutationOutcome {
        let outcome = self.sensor_chain(set, model, rng);
        debug!(?outcome, sensors = self.sensors().len(), wells = self.wells().len(), "Sensor mutation");
        outcome
    }

    fn sensor_chain<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        model: ModelOption,
        rng: &mut R,
    ) -> MutationOutcome {
        if let Some(sensor) = self.try_add_sensor(set, rng) {
            return MutationOutcome::AddedSensor { sensor };
        }
        if let Some(sensor) = self.try_move_sensor_in_bounds(set, rng) {
            return MutationOutcome::MovedSensorInBounds { sensor };
        }
        if let Some(sensor) = self.try_move_any_sensor(set, rng) {
            return MutationOutcome::MovedSensor { sensor };
        }
        match model {
            ModelOption::IndividualSensors => {
                if let Some(column) = self.try_shuffle_well(set, rng) {
                    return MutationOutcome::ShuffledWell { column };
                }
                if let Some((from, to)) = self.try_move_well(set, rng) {
                    return MutationOutcome::MovedWell { from, to };
                }
            }
            ModelOption::IndividualSensors2 => {
                if let Some((from, to)) = self.try_move_well(set, rng) {
                    return MutationOutcome::MovedWell { from, to };
                }
                if let Some(column) = self.try_shuffle_well(set, rng) {
                    return MutationOutcome::ShuffledWell { column };
                }
            }
        }
        MutationOutcome::NoLegalMove
    }

    /// One well-level search step over realized wells: add one under the
    /// cap, repair an out-of-bounds one, or move one.
    pub fn mutate_well<R: Rng + ?Sized>(&mut self, set: &ScenarioSet, rng: &mut R) -> MutationOutcome {
        let outcome = if let Some(column) = self.try_add_realized_well(set, rng) {
            MutationOutcome::AddedRealizedWell { column }
        } else if let Some((from, to)) = self.try_move_realized_well_in_bounds(set, rng) {
            MutationOutcome::MovedRealizedWellInBounds { from, to }
        } else if let Some((from, to)) = self.try_move_realized_well(set, rng) {
            MutationOutcome::MovedRealizedWell { from, to }
        } else {
            MutationOutcome::NoLegalMove
        };
        debug!(?outcome, wells = self.wells().len(), "Well mutation");
        outcome
    }

    // ========================================================================
    // Sensor operators
    // ========================================================================

    /// Add a sensor of a uniformly chosen affordable type, at the add point
    /// when that is valid for the type, otherwise at a random valid node.
    pub fn try_add_sensor<R: Rng + ?Sized>(&mut self, set: &ScenarioSet, rng: &mut R) -> Option<usize> {
        let eligible: Vec<(&str, BTreeSet<NodeId>)> = set
            .sensor_types()
            .map(|t| (t, set.valid_nodes(t, self, NodeQuery::ADD)))
            .filter(|(_, nodes)| !nodes.is_empty())
            .collect();
        let (sensor_type, nodes) = eligible.choose(rng)?;
        let add_point = set.add_point_node();
        let node = if nodes.contains(&add_point) {
            add_point
        } else {
            *nodes.iter().choose(rng)?
        };
        let added = self.add_sensor(ExtendedSensor::new(*sensor_type, node, set.grid()));
        added.then(|| self.sensors().len() - 1)
    }

    /// Move one sensor that is outside its cloud or duplicated. Members of
    /// realized wells are left to the well chain.
    pub fn try_move_sensor_in_bounds<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<usize> {
        let mut candidates = self.out_of_bounds_sensors(set);
        candidates.retain(|&index| !self.in_realized_well(index));
        candidates.shuffle(rng);
        candidates
            .into_iter()
            .find(|&index| self.move_sensor(index, set, rng))
    }

    /// Move one sensor outside realized wells, trying them in random order.
    pub fn try_move_any_sensor<R: Rng + ?Sized>(&mut self, set: &ScenarioSet, rng: &mut R) -> Option<usize> {
        let mut candidates: Vec<usize> = (0..self.sensors().len())
            .filter(|&index| !self.in_realized_well(index))
            .collect();
        candidates.shuffle(rng);
        candidates
            .into_iter()
            .find(|&index| self.move_sensor(index, set, rng))
    }

    /// Relocate one sensor.
    ///
    /// With probability [`NEIGHBOR_BIAS`] a grid neighbor valid for the
    /// sensor's own type is tried first. Otherwise, or if no neighbor is
    /// valid, the affordable types are tried in random order and the sensor
    /// is retyped and placed at a random valid node of the first type that
    /// has one. The sole sensor of a well takes its well along; any other
    /// sensor leaves its well and counts against the well cap.
    pub fn move_sensor<R: Rng + ?Sized>(&mut self, index: usize, set: &ScenarioSet, rng: &mut R) -> bool {
        let Some(current) = self.sensors().get(index) else {
            return false;
        };
        let sensor_type = current.sensor_type().to_string();
        let node = current.node();
        let ijk = current.sensor.ijk;
        let sole = current
            .well()
            .and_then(|w| self.wells().get(w))
            .is_some_and(|w| w.len() == 1);

        let view = self.without(&[index]);
        let query = NodeQuery::new(false, false, !sole);

        if rng.gen_bool(NEIGHBOR_BIAS) {
            let valid = set.valid_nodes(&sensor_type, &view, query);
            let moves: Vec<NodeId> = set
                .grid()
                .neighbors(ijk)
                .into_iter()
                .filter(|n| *n != node && valid.contains(n))
                .collect();
            if let Some(&target) = moves.choose(rng) {
                self.relocate_sensor(index, &sensor_type, target, set);
                return true;
            }
        }

        let mut types = set.valid_switch_types(&sensor_type, self);
        types.shuffle(rng);
        for candidate in types {
            let mut valid = set.valid_nodes(&candidate, &view, query);
            valid.remove(&node);
            if let Some(&target) = valid.iter().choose(rng) {
                self.relocate_sensor(index, &candidate, target, set);
                return true;
            }
        }
        false
    }

    fn in_realized_well(&self, index: usize) -> bool {
        self.sensors()
            .get(index)
            .and_then(ExtendedSensor::well)
            .and_then(|w| self.wells().get(w))
            .is_some_and(Well::is_realized)
    }

    fn relocate_sensor(&mut self, index: usize, sensor_type: &str, node: NodeId, set: &ScenarioSet) {
        let from = self.sensors[index].column();
        let sole = self
            .wells()
            .iter()
            .any(|w| w.column() == from && w.len() == 1);
        self.sensors_mut()[index].retype_and_relocate(sensor_type, node, set.grid());
        let to = self.sensors[index].column();
        if sole && self.realized.remove(&from) {
            self.realized.insert(to);
        }
        self.rebuild_wells();
    }

    // ========================================================================
    // Well operators
    // ========================================================================

    /// Well indices in random order, realized wells or plain ones.
    fn shuffled_well_order<R: Rng + ?Sized>(&self, realized: bool, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.wells().len())
            .filter(|&w| self.wells()[w].is_realized() == realized)
            .collect();
        order.shuffle(rng);
        order
    }

    /// Re-draw the depths of one plain well's sensors, trying wells in
    /// random order.
    pub fn try_shuffle_well<R: Rng + ?Sized>(&mut self, set: &ScenarioSet, rng: &mut R) -> Option<Column> {
        for w in self.shuffled_well_order(false, rng) {
            let column = self.wells()[w].column();
            if self.relocate_well(w, column, set, rng) {
                return Some(column);
            }
        }
        None
    }

    /// Move one plain well to another column, trying wells in random order.
    pub fn try_move_well<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<(Column, Column)> {
        self.shuffled_well_order(false, rng)
            .into_iter()
            .find_map(|w| self.move_well(w, set, rng))
    }

    /// Columns able to take every sensor of well `w`: for each type present,
    /// the column must hold at least as many valid nodes as the well has
    /// sensors of that type.
    pub fn well_column_candidates(&self, w: usize, set: &ScenarioSet) -> BTreeSet<Column> {
        let Some(well) = self.wells().get(w) else {
            return BTreeSet::new();
        };
        let view = self.without(well.members());
        let mut per_type: Vec<BTreeSet<Column>> = well
            .sensor_count_by_type(self.sensors())
            .iter()
            .map(|(sensor_type, &needed)| {
                let mut capacity: BTreeMap<Column, usize> = BTreeMap::new();
                for node in set.valid_nodes(sensor_type, &view, NodeQuery::RELOCATE) {
                    *capacity.entry(set.grid().ijk(node).column()).or_insert(0) += 1;
                }
                capacity
                    .into_iter()
                    .filter(|&(_, n)| n >= needed)
                    .map(|(c, _)| c)
                    .collect()
            })
            .collect();

        // Seed from the most constraining type
        per_type.sort_by_key(BTreeSet::len);
        let mut sets = per_type.into_iter();
        let Some(mut candidates) = sets.next() else {
            return BTreeSet::new();
        };
        for other in sets {
            candidates.retain(|c| other.contains(c));
        }
        candidates
    }

    /// Move well `w` to a valid column, preferring an adjacent one.
    pub fn move_well<R: Rng + ?Sized>(
        &mut self,
        w: usize,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<(Column, Column)> {
        let from = self.wells().get(w)?.column();
        let mut candidates = self.well_column_candidates(w, set);
        candidates.remove(&from);
        let target = pick_column(&candidates, from, rng)?;
        self.relocate_well(w, target, set, rng).then_some((from, target))
    }

    /// Re-home every sensor of well `w` into column `target`, each to a
    /// valid node of its own type drawn in random order. Fails without
    /// touching anything if any type lacks room, or, when `target` is the
    /// well's own column, if no type has a node to spare so that every
    /// sensor would land where a sensor of its type already sits.
    pub fn relocate_well<R: Rng + ?Sized>(
        &mut self,
        w: usize,
        target: Column,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> bool {
        let Some(well) = self.wells().get(w) else {
            return false;
        };
        let from = well.column();
        let members = well.members().to_vec();
        let view = self.without(&members);

        let mut by_type: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for &m in &members {
            by_type
                .entry(self.sensors()[m].sensor_type().to_string())
                .or_default()
                .push(m);
        }

        let column_nodes = set.grid().nodes_in_column(target);
        let mut plan: Vec<(usize, NodeId)> = Vec::with_capacity(members.len());
        let mut changed = from != target;
        for (sensor_type, sensors) in &by_type {
            let valid = set.valid_nodes(sensor_type, &view, NodeQuery::RELOCATE);
            let mut nodes: Vec<NodeId> = column_nodes
                .iter()
                .copied()
                .filter(|n| valid.contains(n))
                .collect();
            if nodes.len() < sensors.len() {
                debug!(
                    column = %target,
                    sensor_type = %sensor_type,
                    have = nodes.len(),
                    need = sensors.len(),
                    "Well relocation lacks room"
                );
                return false;
            }
            nodes.shuffle(rng);
            let (chosen, spare) = nodes.split_at_mut(sensors.len());
            if !changed {
                let current: BTreeSet<NodeId> = sensors.iter().map(|&m| self.sensors()[m].node()).collect();
                if chosen.iter().copied().collect::<BTreeSet<_>>() != current {
                    changed = true;
                } else if let (Some(kept), Some(free)) = (chosen.first_mut(), spare.first_mut()) {
                    std::mem::swap(kept, free);
                    changed = true;
                }
            }
            plan.extend(sensors.iter().copied().zip(chosen.iter().copied()));
        }
        if !changed {
            debug!(column = %target, "Well shuffle has no free node");
            return false;
        }

        let grid = set.grid();
        for (index, node) in plan {
            self.sensors_mut()[index].relocate(node, grid);
        }
        if from != target && self.realized.remove(&from) {
            self.realized.insert(target);
        }
        self.rebuild_wells();
        true
    }

    // ========================================================================
    // Realized well operators
    // ========================================================================

    /// Add a realized well under the cap: at the add point's column when it
    /// is free, otherwise at a random free cloud column.
    pub fn try_add_realized_well<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<Column> {
        if self.wells().len() >= set.constraints().max_wells {
            return None;
        }
        let occupied: BTreeSet<Column> = self.wells().iter().map(|w| w.column()).collect();
        let free = |c: &Column| !occupied.contains(c) && set.spacing_allows(*c, None, self);

        let add_column = set.constraints().add_point.column();
        let column = if free(&add_column) {
            add_column
        } else {
            let open: Vec<Column> = set.cloud_columns().into_iter().filter(|c| free(c)).collect();
            *open.choose(rng)?
        };

        let grid = set.grid();
        let types: Vec<String> = set.sensor_types().map(str::to_string).collect();
        for sensor_type in &types {
            for k in 1..=grid.k_max() {
                self.sensors
                    .push(ExtendedSensor::new(sensor_type.as_str(), grid.node_id(column.at(k)), grid));
            }
        }
        self.realized.insert(column);
        self.rebuild_wells();
        Some(column)
    }

    /// Move a realized well none of whose sensors is in its cloud.
    pub fn try_move_realized_well_in_bounds<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<(Column, Column)> {
        let mut stranded: Vec<usize> = self
            .wells()
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_realized() && w.is_out_of_bounds(self.sensors(), set))
            .map(|(i, _)| i)
            .collect();
        stranded.shuffle(rng);
        stranded
            .into_iter()
            .find_map(|w| self.move_realized_well(w, set, rng))
    }

    /// Move any realized well, trying them in random order.
    pub fn try_move_realized_well<R: Rng + ?Sized>(
        &mut self,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<(Column, Column)> {
        self.shuffled_well_order(true, rng)
            .into_iter()
            .find_map(|w| self.move_realized_well(w, set, rng))
    }

    /// Move realized well `w` as a whole column, keeping each sensor's depth.
    ///
    /// Targets are columns in the cloud of a contained type, free of other
    /// wells and passing the spacing rules; adjacent ones are preferred.
    pub fn move_realized_well<R: Rng + ?Sized>(
        &mut self,
        w: usize,
        set: &ScenarioSet,
        rng: &mut R,
    ) -> Option<(Column, Column)> {
        let well = self.wells().get(w).filter(|w| w.is_realized())?;
        let from = well.column();
        let members = well.members().to_vec();
        let types = well.sensor_count_by_type(self.sensors());
        let view = self.without(&members);
        let occupied: BTreeSet<Column> = view.wells().iter().map(|w| w.column()).collect();

        let grid = set.grid();
        let candidates: BTreeSet<Column> = types
            .keys()
            .flat_map(|t| {
                set.cloud(t)
                    .iter()
                    .map(|&n| grid.ijk(n).column())
                    .collect::<Vec<_>>()
            })
            .filter(|c| *c != from && !occupied.contains(c))
            .filter(|c| set.spacing_allows(*c, None, &view))
            .collect();
        let target = pick_column(&candidates, from, rng)?;

        for m in members {
            let k = self.sensors()[m].sensor.ijk.k;
            self.sensors_mut()[m].relocate(grid.node_id(target.at(k)), grid);
        }
        self.realized.remove(&from);
        self.realized.insert(target);
        self.rebuild_wells();
        Some((from, target))
    }
}

/// Pick a target column: with probability [`NEIGHBOR_BIAS`] an adjacent
/// candidate if there is one, otherwise any candidate.
fn pick_column<R: Rng + ?Sized>(candidates: &BTreeSet<Column>, from: Column, rng: &mut R) -> Option<Column> {
    let adjacent: Vec<Column> = candidates
        .iter()
        .copied()
        .filter(|c| c.is_adjacent(from))
        .collect();
    if !adjacent.is_empty() && rng.gen_bool(NEIGHBOR_BIAS) {
        return adjacent.choose(rng).copied();
    }
    candidates.iter().copied().choose(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryFieldData;
    use crate::grid::{Ijk, NodeStructure, Xyz};
    use crate::placement::{Configuration, Constraints};
    use crate::sensors::{DeltaType, Trigger, UserSettings};
    use crate::types::{Scenario, TimeStep};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    /// Unit-cell grid; each listed type (cost 10) rises at exactly its cells.
    fn cloud_set(dims: [usize; 3], clouds: &[(&str, &[Ijk])]) -> ScenarioSet {
        let steps = vec![TimeStep::new(0, 0.0), TimeStep::new(1, 1.0)];
        let grid = NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &vec![1.0; dims[0]],
            &vec![1.0; dims[1]],
            &vec![1.0; dims[2]],
            steps.clone(),
        )
        .unwrap();
        let s = Scenario::new("s1");
        let mut data = InMemoryFieldData::new(grid.total_nodes());
        for &(t, cells) in clouds {
            for node in grid.node_ids() {
                data.set_constant(&s, t, &steps, node, 0.0);
            }
            for &cell in cells {
                data.set_value(&s, t, 1, grid.node_id(cell), 1.0);
            }
        }
        let types: Vec<&str> = clouds.iter().map(|&(t, _)| t).collect();
        let mut set = ScenarioSet::new(grid, vec![s], &types, Arc::new(data)).unwrap();
        for t in types {
            let rise = UserSettings {
                cost: 10.0,
                trigger: Trigger::AbsoluteDelta,
                delta_type: DeltaType::Increase,
                lower_threshold: 0.5,
                ..set.setting(t).unwrap().user_settings()
            };
            set.apply_user_settings(t, &rise).unwrap();
        }
        set
    }

    fn config_with(set: &ScenarioSet, sensors: &[(&str, Ijk)]) -> ExtendedConfiguration {
        let mut config = ExtendedConfiguration::new();
        for &(t, ijk) in sensors {
            config.add_sensor(ExtendedSensor::new(t, set.grid().node_id(ijk), set.grid()));
        }
        config
    }

    fn layer(n: usize) -> Vec<Ijk> {
        (1..=n)
            .flat_map(|j| (1..=n).map(move |i| Ijk::new(i, j, 1)))
            .collect()
    }

    /// Two types in a 3x3x2 grid; the well at (1, 1) holds two "a" and one "b".
    ///
    /// Columns with two "a" nodes: (1,1) (3,1) (2,2). Columns with a "b"
    /// node: (1,1) (2,1) (3,1) (3,3).
    fn two_type_well() -> (ScenarioSet, ExtendedConfiguration) {
        let a: &[Ijk] = &[
            Ijk::new(1, 1, 1),
            Ijk::new(1, 1, 2),
            Ijk::new(2, 1, 1),
            Ijk::new(3, 1, 1),
            Ijk::new(3, 1, 2),
            Ijk::new(2, 2, 1),
            Ijk::new(2, 2, 2),
        ];
        let b: &[Ijk] = &[
            Ijk::new(1, 1, 2),
            Ijk::new(2, 1, 1),
            Ijk::new(3, 1, 2),
            Ijk::new(3, 3, 1),
        ];
        let set = cloud_set([3, 3, 2], &[("a", a), ("b", b)]);
        let config = config_with(
            &set,
            &[("a", Ijk::new(1, 1, 1)), ("a", Ijk::new(1, 1, 2)), ("b", Ijk::new(1, 1, 1))],
        );
        (set, config)
    }

    #[test]
    fn test_move_sensor_prefers_neighbors() {
        let cells = layer(9);
        let set = cloud_set([9, 9, 1], &[("a", cells.as_slice())]);
        let start = config_with(&set, &[("a", Ijk::new(5, 5, 1))]);
        let neighbors = set.grid().neighbors(Ijk::new(5, 5, 1));

        let mut adjacent = 0;
        for seed in 0..400 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut config = start.make_copy();
            assert!(config.move_sensor(0, &set, &mut rng));
            assert_ne!(config.sensors()[0].node(), start.sensors()[0].node());
            if neighbors.contains(&config.sensors()[0].node()) {
                adjacent += 1;
            }
        }
        // 80% neighbor moves, plus 8 of 80 nodes for a random draw
        assert!((290..=360).contains(&adjacent), "adjacent moves: {adjacent}");
    }

    #[test]
    fn test_move_sensor_retypes_when_own_type_is_full() {
        let a: &[Ijk] = &[Ijk::new(1, 1, 1)];
        let b: &[Ijk] = &[Ijk::new(3, 3, 1)];
        let set = cloud_set([3, 3, 1], &[("a", a), ("b", b)]);
        let start = config_with(&set, &[("a", Ijk::new(1, 1, 1))]);

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut config = start.make_copy();
            assert!(config.move_sensor(0, &set, &mut rng));
            let moved = &config.sensors()[0];
            assert_eq!(moved.sensor_type(), "b");
            assert_eq!(moved.node(), set.grid().node_id(Ijk::new(3, 3, 1)));
            assert_eq!(config.wells().len(), 1);
            assert_eq!(config.wells()[0].column(), Column::new(3, 3));
        }
        assert!(!start.make_copy().move_sensor(7, &set, &mut StdRng::seed_from_u64(0)));
    }

    #[test]
    fn test_sole_sensor_carries_realized_column_and_drops_state() {
        let cells = layer(3);
        let mut set = cloud_set([3, 3, 1], &[("a", cells.as_slice())]);
        set.set_constraints(Constraints {
            add_point: Ijk::new(2, 2, 1),
            ..Constraints::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut config = ExtendedConfiguration::new();
        assert_eq!(config.try_add_realized_well(&set, &mut rng), Some(Column::new(2, 2)));
        assert_eq!(config.sensors().len(), 1);

        let s1 = Scenario::new("s1");
        let step = TimeStep::new(1, 1.0);
        config.sensors_mut()[0].set_triggered(true, &s1, step, 1.0);
        assert!(config.sensors()[0].triggered_by(&s1, step));

        assert!(config.move_sensor(0, &set, &mut rng));
        let moved = &config.sensors()[0];
        assert_ne!(moved.column(), Column::new(2, 2));
        assert!(moved.state.history.is_empty());
        assert!(moved.state.evidence.is_empty());
        assert!(!moved.state.triggering);
        assert_eq!(moved.well(), Some(0));
        assert!(config.wells()[0].is_realized());
        assert_eq!(config.realized_columns(), &BTreeSet::from([moved.column()]));
    }

    #[test]
    fn test_well_column_candidates_intersect_types() {
        let (set, config) = two_type_well();
        let candidates = config.well_column_candidates(0, &set);
        assert_eq!(candidates, BTreeSet::from([Column::new(1, 1), Column::new(3, 1)]));
        assert!(config.well_column_candidates(5, &set).is_empty());
    }

    #[test]
    fn test_relocate_well_is_all_or_nothing() {
        let (set, mut config) = two_type_well();
        let before = Configuration::from(&config);
        let mut rng = StdRng::seed_from_u64(2);

        // (2, 2) has no "b" node, (2, 1) one "a" node, (3, 3) no "a" node
        for target in [Column::new(2, 2), Column::new(2, 1), Column::new(3, 3)] {
            assert!(!config.relocate_well(0, target, &set, &mut rng), "moved to {target:?}");
            assert_eq!(Configuration::from(&config), before);
        }

        assert!(config.relocate_well(0, Column::new(3, 1), &set, &mut rng));
        assert_eq!(config.wells().len(), 1);
        assert_eq!(config.wells()[0].column(), Column::new(3, 1));
        assert_eq!(
            config.sensor_positions("a"),
            BTreeSet::from([
                set.grid().node_id(Ijk::new(3, 1, 1)),
                set.grid().node_id(Ijk::new(3, 1, 2)),
            ])
        );
        assert_eq!(
            config.sensor_positions("b"),
            BTreeSet::from([set.grid().node_id(Ijk::new(3, 1, 2))])
        );
    }

    #[test]
    fn test_shuffle_needs_a_free_node() {
        let deep: &[Ijk] = &[Ijk::new(1, 1, 1), Ijk::new(1, 1, 2), Ijk::new(1, 1, 3)];
        let set = cloud_set([1, 1, 3], &[("a", deep)]);
        let start = config_with(&set, &[("a", Ijk::new(1, 1, 1))]);
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut config = start.make_copy();
            assert_eq!(config.try_shuffle_well(&set, &mut rng), Some(Column::new(1, 1)));
            assert_ne!(config.sensors()[0].node(), start.sensors()[0].node());
        }

        let single: &[Ijk] = &[Ijk::new(1, 1, 1)];
        let set = cloud_set([1, 1, 3], &[("a", single)]);
        let mut config = config_with(&set, &[("a", Ijk::new(1, 1, 1))]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(config.try_shuffle_well(&set, &mut rng), None);
        assert!(!config.relocate_well(0, Column::new(1, 1), &set, &mut rng));
        assert_eq!(config.sensors()[0].node(), set.grid().node_id(Ijk::new(1, 1, 1)));
    }

    #[test]
    fn test_pick_column_prefers_adjacent() {
        let from = Column::new(1, 1);
        let candidates = BTreeSet::from([Column::new(2, 2), Column::new(3, 3)]);
        let near = (0..400)
            .filter(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                pick_column(&candidates, from, &mut rng) == Some(Column::new(2, 2))
            })
            .count();
        // 80% adjacent, plus half of the uniform draws
        assert!((330..=385).contains(&near), "adjacent picks: {near}");

        let far = BTreeSet::from([Column::new(3, 3)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_column(&far, from, &mut rng), Some(Column::new(3, 3)));
        assert_eq!(pick_column(&BTreeSet::new(), from, &mut rng), None);
    }
}
