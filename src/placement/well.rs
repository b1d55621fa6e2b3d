//! Wells: groups of co-located sensors, derived from the sensor list.
//!
//! Wells are never edited in place. After any change to the sensor list the
//! owning configuration calls [`derive_wells`], which partitions the sensors
//! by column. A column listed as realized yields a [`WellKind::Realized`]
//! well, which carries one sensor of every type at every depth.

use super::scenario_set::ScenarioSet;
use crate::grid::Column;
use crate::sensors::ExtendedSensor;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WellKind {
    Plain,
    Realized,
}

/// Sensors sharing one `(i, j)` column, addressed by index into the
/// configuration's sensor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Well {
    column: Column,
    kind: WellKind,
    members: Vec<usize>,
}

impl Well {
    pub const fn column(&self) -> Column {
        self.column
    }

    pub const fn kind(&self) -> WellKind {
        self.kind
    }

    pub fn is_realized(&self) -> bool {
        self.kind == WellKind::Realized
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_sensors<'a>(
        &'a self,
        sensors: &'a [ExtendedSensor],
    ) -> impl Iterator<Item = &'a ExtendedSensor> + 'a {
        self.members.iter().filter_map(move |&m| sensors.get(m))
    }

    /// Does the well hold a sensor of `sensor_type`?
    pub fn has_type(&self, sensors: &[ExtendedSensor], sensor_type: &str) -> bool {
        self.member_sensors(sensors)
            .any(|s| s.sensor_type() == sensor_type)
    }

    /// Number of member sensors per type.
    pub fn sensor_count_by_type(&self, sensors: &[ExtendedSensor]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in self.member_sensors(sensors) {
            *counts.entry(s.sensor_type().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// A realized well is out of bounds when none of its sensors sits in the
    /// cloud of its own type.
    pub fn is_out_of_bounds(&self, sensors: &[ExtendedSensor], set: &ScenarioSet) -> bool {
        !self
            .member_sensors(sensors)
            .any(|s| set.in_cloud(s.sensor_type(), s.node()))
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WellKind::Plain => write!(f, "Well at {} ({} sensors)", self.column, self.members.len()),
            WellKind::Realized => write!(
                f,
                "Realized well at {} ({} sensors)",
                self.column,
                self.members.len()
            ),
        }
    }
}

/// Partition `sensors` into wells by column.
///
/// Wells are listed in order of their first sensor; every sensor lands in
/// exactly one well.
pub fn derive_wells(sensors: &[ExtendedSensor], realized: &BTreeSet<Column>) -> Vec<Well> {
    let mut wells: Vec<Well> = Vec::new();
    let mut by_column: BTreeMap<Column, usize> = BTreeMap::new();
    for (index, sensor) in sensors.iter().enumerate() {
        let column = sensor.column();
        let slot = *by_column.entry(column).or_insert_with(|| {
            wells.push(Well {
                column,
                kind: if realized.contains(&column) {
                    WellKind::Realized
                } else {
                    WellKind::Plain
                },
                members: Vec::new(),
            });
            wells.len() - 1
        });
        wells[slot].members.push(index);
    }
    wells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Ijk, NodeStructure, Xyz};

    fn make_grid() -> NodeStructure {
        NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[1.0; 3],
            &[1.0; 3],
            &[1.0; 3],
            Vec::new(),
        )
        .unwrap()
    }

    fn sensor(grid: &NodeStructure, t: &str, ijk: Ijk) -> ExtendedSensor {
        ExtendedSensor::new(t, grid.node_id(ijk), grid)
    }

    #[test]
    fn test_derive_wells_partitions_by_column() {
        let grid = make_grid();
        let sensors = vec![
            sensor(&grid, "a", Ijk::new(1, 1, 1)),
            sensor(&grid, "b", Ijk::new(2, 2, 3)),
            sensor(&grid, "a", Ijk::new(1, 1, 3)),
            sensor(&grid, "b", Ijk::new(2, 2, 1)),
            sensor(&grid, "a", Ijk::new(3, 1, 2)),
        ];
        let realized: BTreeSet<Column> = [Column::new(2, 2)].into_iter().collect();
        let wells = derive_wells(&sensors, &realized);

        assert_eq!(wells.len(), 3);
        assert_eq!(wells[0].column(), Column::new(1, 1));
        assert_eq!(wells[0].members(), &[0, 2]);
        assert!(wells[1].is_realized());
        assert_eq!(wells[1].members(), &[1, 3]);
        assert_eq!(wells[2].kind(), WellKind::Plain);

        let mut seen: Vec<usize> = wells.iter().flat_map(|w| w.members().to_vec()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        for w in &wells {
            assert!(w.member_sensors(&sensors).all(|s| s.column() == w.column()));
        }
    }

    #[test]
    fn test_type_queries() {
        let grid = make_grid();
        let sensors = vec![
            sensor(&grid, "a", Ijk::new(1, 1, 1)),
            sensor(&grid, "a", Ijk::new(1, 1, 2)),
            sensor(&grid, "b", Ijk::new(1, 1, 3)),
        ];
        let wells = derive_wells(&sensors, &BTreeSet::new());
        let counts = wells[0].sensor_count_by_type(&sensors);
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&1));
        assert!(wells[0].has_type(&sensors, "b"));
        assert!(!wells[0].has_type(&sensors, "c"));
        assert!(derive_wells(&[], &BTreeSet::new()).is_empty());
    }
}
