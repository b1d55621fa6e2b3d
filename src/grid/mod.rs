//! Node Structure: the spatial index of the discretized subsurface grid
//!
//! Maps between three addressings of a grid cell:
//!
//! - `(i, j, k)` cell indices, 1-based, `k` increasing with `z`
//! - a linear node id, `(k-1)·iMax·jMax + (j-1)·iMax + i`
//! - physical coordinates, either the cell center or its lower edge
//!
//! Cell edges are cumulative: edge `n` of an axis sits at the axis origin
//! plus the sum of the first `n-1` cell widths. Grids loaded from simulation
//! output only carry cell centers, in which case the outer edges are
//! extrapolated half a cell outward and inner edges are center midpoints.
//!
//! ## Usage
//!
//! ```ignore
//! let grid = NodeStructure::from_cell_widths(origin, &dx, &dy, &dz, steps)?;
//! let id = grid.node_id(Ijk::new(2, 3, 1));
//! let neighbors = grid.neighbors(grid.ijk(id));
//! ```

mod coords;

pub use coords::{Column, Ijk, Xyz};

use crate::error::GridError;
use crate::types::TimeStep;
use serde::Serialize;

/// Linear, 1-based node identifier.
pub type NodeId = usize;

/// One axis of the grid: `n` cell centers and `n + 1` cell edges.
#[derive(Debug, Clone, Serialize)]
struct Axis {
    centers: Vec<f64>,
    edges: Vec<f64>,
}

impl Axis {
    fn from_centers(name: char, centers: &[f64]) -> Result<Self, GridError> {
        check_axis(name, centers)?;
        let n = centers.len();
        let mut edges = Vec::with_capacity(n + 1);
        if n == 1 {
            edges.push(centers[0] - 0.5);
            edges.push(centers[0] + 0.5);
        } else {
            edges.push(centers[0] - (centers[1] - centers[0]) / 2.0);
            for pair in centers.windows(2) {
                edges.push((pair[0] + pair[1]) / 2.0);
            }
            edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
        }
        Ok(Self {
            centers: centers.to_vec(),
            edges,
        })
    }

    fn from_widths(name: char, origin: f64, widths: &[f64]) -> Result<Self, GridError> {
        if widths.is_empty() {
            return Err(GridError::EmptyAxis { axis: name });
        }
        let mut edges = Vec::with_capacity(widths.len() + 1);
        let mut at = origin;
        edges.push(at);
        for (index, &w) in widths.iter().enumerate() {
            if !w.is_finite() {
                return Err(GridError::NonFinite { axis: name, index });
            }
            if w <= 0.0 {
                return Err(GridError::NotIncreasing { axis: name, index });
            }
            at += w;
            edges.push(at);
        }
        let centers = edges.windows(2).map(|e| (e[0] + e[1]) / 2.0).collect();
        Ok(Self { centers, edges })
    }

    fn len(&self) -> usize {
        self.centers.len()
    }

    /// 1-based cell containing `coord`, or `None` outside the outer edges.
    fn cell_of(&self, coord: f64) -> Option<usize> {
        let first = *self.edges.first()?;
        let last = *self.edges.last()?;
        if !(first..=last).contains(&coord) {
            return None;
        }
        // Count of inner edges at or below the coordinate
        let inner = &self.edges[1..self.edges.len() - 1];
        Some(inner.partition_point(|&e| e <= coord) + 1)
    }
}

fn check_axis(name: char, values: &[f64]) -> Result<(), GridError> {
    if values.is_empty() {
        return Err(GridError::EmptyAxis { axis: name });
    }
    for (index, v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(GridError::NonFinite { axis: name, index });
        }
    }
    for (index, pair) in values.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(GridError::NotIncreasing {
                axis: name,
                index: index + 1,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Node Structure
// ============================================================================

/// Immutable grid geometry shared by a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStructure {
    x: Axis,
    y: Axis,
    z: Axis,
    time_steps: Vec<TimeStep>,
}

impl NodeStructure {
    /// Build from per-axis cell centers, as read from simulation output.
    pub fn from_centers(
        x: &[f64],
        y: &[f64],
        z: &[f64],
        time_steps: Vec<TimeStep>,
    ) -> Result<Self, GridError> {
        Ok(Self {
            x: Axis::from_centers('x', x)?,
            y: Axis::from_centers('y', y)?,
            z: Axis::from_centers('z', z)?,
            time_steps,
        })
    }

    /// Build from an origin and per-axis cell widths.
    pub fn from_cell_widths(
        origin: Xyz,
        dx: &[f64],
        dy: &[f64],
        dz: &[f64],
        time_steps: Vec<TimeStep>,
    ) -> Result<Self, GridError> {
        Ok(Self {
            x: Axis::from_widths('x', origin.x, dx)?,
            y: Axis::from_widths('y', origin.y, dy)?,
            z: Axis::from_widths('z', origin.z, dz)?,
            time_steps,
        })
    }

    pub fn dims(&self) -> Ijk {
        Ijk::new(self.x.len(), self.y.len(), self.z.len())
    }

    pub fn i_max(&self) -> usize {
        self.x.len()
    }

    pub fn j_max(&self) -> usize {
        self.y.len()
    }

    pub fn k_max(&self) -> usize {
        self.z.len()
    }

    pub fn total_nodes(&self) -> usize {
        self.i_max() * self.j_max() * self.k_max()
    }

    /// Every node id of the grid, in increasing order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        1..=self.total_nodes()
    }

    pub fn time_steps(&self) -> &[TimeStep] {
        &self.time_steps
    }

    /// Real time of the step with the given index, if the grid has one.
    pub fn time_at(&self, index: usize) -> Option<f64> {
        match self.time_steps.get(index) {
            Some(step) if step.index == index => Some(step.real_time),
            _ => self
                .time_steps
                .iter()
                .find(|s| s.index == index)
                .map(|s| s.real_time),
        }
    }

    pub fn contains(&self, ijk: Ijk) -> bool {
        (1..=self.i_max()).contains(&ijk.i)
            && (1..=self.j_max()).contains(&ijk.j)
            && (1..=self.k_max()).contains(&ijk.k)
    }

    pub fn contains_column(&self, column: Column) -> bool {
        (1..=self.i_max()).contains(&column.i) && (1..=self.j_max()).contains(&column.j)
    }

    fn check(&self, ijk: Ijk) -> Result<(), GridError> {
        if self.contains(ijk) {
            Ok(())
        } else {
            Err(GridError::OutOfBounds {
                i: ijk.i,
                j: ijk.j,
                k: ijk.k,
                i_max: self.i_max(),
                j_max: self.j_max(),
                k_max: self.k_max(),
            })
        }
    }

    // ========================================================================
    // Id <-> index
    // ========================================================================

    /// Linear id of a cell. The cell must lie inside the grid.
    pub fn node_id(&self, ijk: Ijk) -> NodeId {
        debug_assert!(self.contains(ijk), "cell {ijk} outside grid");
        let (i_max, j_max) = (self.i_max(), self.j_max());
        (ijk.k - 1) * i_max * j_max + (ijk.j - 1) * i_max + ijk.i
    }

    /// Checked form of [`Self::node_id`].
    pub fn try_node_id(&self, ijk: Ijk) -> Result<NodeId, GridError> {
        self.check(ijk)?;
        Ok(self.node_id(ijk))
    }

    /// Cell indices of a node id in `1..=total_nodes()`.
    pub fn ijk(&self, node: NodeId) -> Ijk {
        debug_assert!((1..=self.total_nodes()).contains(&node), "node {node} outside grid");
        let layer_size = self.i_max() * self.j_max();
        let offset = node - 1;
        let k = offset / layer_size;
        let in_layer = offset - k * layer_size;
        let j = in_layer / self.i_max();
        let i = in_layer - j * self.i_max();
        Ijk::new(i + 1, j + 1, k + 1)
    }

    // ========================================================================
    // Physical coordinates
    // ========================================================================

    /// Cell center of a node.
    pub fn xyz_center(&self, ijk: Ijk) -> Xyz {
        Xyz::new(
            self.x.centers[ijk.i - 1],
            self.y.centers[ijk.j - 1],
            self.z.centers[ijk.k - 1],
        )
    }

    /// Lower cell edge of a node. Indices up to `dims + 1` address the
    /// upper outer edge of the grid.
    pub fn xyz_edge(&self, ijk: Ijk) -> Option<Xyz> {
        Some(Xyz::new(
            *self.x.edges.get(ijk.i.checked_sub(1)?)?,
            *self.y.edges.get(ijk.j.checked_sub(1)?)?,
            *self.z.edges.get(ijk.k.checked_sub(1)?)?,
        ))
    }

    /// Cell containing a physical point, or `None` outside the grid.
    pub fn ijk_from_xyz(&self, point: Xyz) -> Option<Ijk> {
        Some(Ijk::new(
            self.x.cell_of(point.x)?,
            self.y.cell_of(point.y)?,
            self.z.cell_of(point.z)?,
        ))
    }

    pub fn node_id_from_xyz(&self, point: Xyz) -> Option<NodeId> {
        self.ijk_from_xyz(point).map(|ijk| self.node_id(ijk))
    }

    /// Bulk volume of a cell.
    pub fn node_volume(&self, ijk: Ijk) -> Option<f64> {
        let lower = self.xyz_edge(ijk)?;
        let upper = self.xyz_edge(Ijk::new(ijk.i + 1, ijk.j + 1, ijk.k + 1))?;
        Some(((upper.x - lower.x) * (upper.y - lower.y) * (upper.z - lower.z)).abs())
    }

    /// Smallest and largest cell-center depth.
    pub fn z_range(&self) -> (f64, f64) {
        let first = self.z.centers.first().copied().unwrap_or_default();
        let last = self.z.centers.last().copied().unwrap_or_default();
        (first, last)
    }

    /// Top of the grid: the largest edge `z`.
    pub fn top_edge_z(&self) -> f64 {
        self.z.edges.last().copied().unwrap_or_default()
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// Up to 26 grid-adjacent nodes, clipped to bounds, excluding the node itself.
    pub fn neighbors(&self, ijk: Ijk) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(26);
        for k in ijk.k.saturating_sub(1).max(1)..=(ijk.k + 1).min(self.k_max()) {
            for j in ijk.j.saturating_sub(1).max(1)..=(ijk.j + 1).min(self.j_max()) {
                for i in ijk.i.saturating_sub(1).max(1)..=(ijk.i + 1).min(self.i_max()) {
                    let n = Ijk::new(i, j, k);
                    if n != ijk {
                        out.push(self.node_id(n));
                    }
                }
            }
        }
        out
    }

    /// Every node of a vertical column, shallow index first.
    pub fn nodes_in_column(&self, column: Column) -> Vec<NodeId> {
        (1..=self.k_max())
            .map(|k| self.node_id(Ijk::new(column.i, column.j, k)))
            .collect()
    }

    /// Every `(i, j)` column of the grid.
    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        (1..=self.j_max()).flat_map(move |j| (1..=self.i_max()).map(move |i| Column::new(i, j)))
    }

    /// Horizontal distance between two columns, measured between the
    /// cell centers of their `k = 1` nodes.
    pub fn column_distance(&self, a: Column, b: Column) -> f64 {
        self.xyz_center(a.at(1)).distance(&self.xyz_center(b.at(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_grid() -> NodeStructure {
        NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[10.0, 20.0, 30.0, 40.0],
            &[5.0, 5.0, 5.0],
            &[1.0, 2.0],
            vec![TimeStep::new(0, 0.0), TimeStep::new(1, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_node_id_bijection() {
        let grid = make_grid();
        assert_eq!(grid.total_nodes(), 24);
        for id in grid.node_ids() {
            let ijk = grid.ijk(id);
            assert!(grid.contains(ijk));
            assert_eq!(grid.node_id(ijk), id, "round trip failed for {ijk}");
        }
    }

    #[test]
    fn test_node_id_layout() {
        let grid = make_grid();
        assert_eq!(grid.node_id(Ijk::new(1, 1, 1)), 1);
        assert_eq!(grid.node_id(Ijk::new(4, 1, 1)), 4);
        assert_eq!(grid.node_id(Ijk::new(1, 2, 1)), 5);
        assert_eq!(grid.node_id(Ijk::new(1, 1, 2)), 13);
        assert_eq!(grid.ijk(24), Ijk::new(4, 3, 2));
        assert!(grid.try_node_id(Ijk::new(5, 1, 1)).is_err());
        assert!(grid.try_node_id(Ijk::new(0, 1, 1)).is_err());
    }

    #[test]
    fn test_edges_are_cumulative_widths() {
        let grid = make_grid();
        let e = grid.xyz_edge(Ijk::new(3, 2, 2)).unwrap();
        assert!((e.x - 30.0).abs() < 1e-9);
        assert!((e.y - 5.0).abs() < 1e-9);
        assert!((e.z - 1.0).abs() < 1e-9);
        let c = grid.xyz_center(Ijk::new(3, 2, 2));
        assert!((c.x - 45.0).abs() < 1e-9);
        assert!((c.z - 2.0).abs() < 1e-9);
        // Upper outer edge is addressable
        let top = grid.xyz_edge(Ijk::new(5, 4, 3)).unwrap();
        assert!((top.x - 100.0).abs() < 1e-9);
        assert!(grid.xyz_edge(Ijk::new(6, 1, 1)).is_none());
    }

    #[test]
    fn test_edges_from_centers_extrapolate_half_cell() {
        let grid = NodeStructure::from_centers(&[1.0, 3.0, 7.0], &[0.5], &[10.0, 20.0], Vec::new())
            .unwrap();
        let lo = grid.xyz_edge(Ijk::new(1, 1, 1)).unwrap();
        assert!((lo.x - 0.0).abs() < 1e-9);
        assert!((lo.y - 0.0).abs() < 1e-9);
        assert!((lo.z - 5.0).abs() < 1e-9);
        let mid = grid.xyz_edge(Ijk::new(3, 1, 2)).unwrap();
        assert!((mid.x - 5.0).abs() < 1e-9);
        assert!((mid.z - 15.0).abs() < 1e-9);
        let hi = grid.xyz_edge(Ijk::new(4, 2, 3)).unwrap();
        assert!((hi.x - 9.0).abs() < 1e-9);
        assert!((hi.z - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_malformed_axes() {
        assert_eq!(
            NodeStructure::from_centers(&[1.0, 1.0], &[1.0], &[1.0], Vec::new()).unwrap_err(),
            GridError::NotIncreasing { axis: 'x', index: 1 }
        );
        assert_eq!(
            NodeStructure::from_centers(&[1.0], &[], &[1.0], Vec::new()).unwrap_err(),
            GridError::EmptyAxis { axis: 'y' }
        );
        assert!(NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[1.0],
            &[1.0],
            &[f64::NAN],
            Vec::new()
        )
        .is_err());
    }

    #[test]
    fn test_xyz_lookup_inverts_centers() {
        let grid = make_grid();
        for id in grid.node_ids() {
            let ijk = grid.ijk(id);
            assert_eq!(grid.ijk_from_xyz(grid.xyz_center(ijk)), Some(ijk));
            assert_eq!(grid.node_id_from_xyz(grid.xyz_center(ijk)), Some(id));
        }
        assert_eq!(grid.ijk_from_xyz(Xyz::new(-1.0, 1.0, 1.0)), None);
        assert_eq!(grid.ijk_from_xyz(Xyz::new(100.0, 15.0, 3.0)), Some(Ijk::new(4, 3, 2)));
    }

    #[test]
    fn test_neighbors_clipped_and_symmetric() {
        let grid = make_grid();
        assert_eq!(grid.neighbors(Ijk::new(1, 1, 1)).len(), 7);
        assert_eq!(grid.neighbors(Ijk::new(2, 2, 1)).len(), 17);
        for id in grid.node_ids() {
            let ijk = grid.ijk(id);
            let around = grid.neighbors(ijk);
            assert!(!around.contains(&id), "node {id} listed as its own neighbor");
            for n in around {
                assert!(
                    grid.neighbors(grid.ijk(n)).contains(&id),
                    "neighbor relation not symmetric for {id} and {n}"
                );
            }
        }
    }

    #[test]
    fn test_columns_and_distances() {
        let grid = make_grid();
        assert_eq!(grid.columns().count(), 12);
        assert_eq!(grid.nodes_in_column(Column::new(2, 1)), vec![2, 14]);
        let d = grid.column_distance(Column::new(1, 1), Column::new(2, 1));
        assert!((d - 15.0).abs() < 1e-9);
        assert!((grid.node_volume(Ijk::new(1, 1, 1)).unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(grid.time_at(1), Some(5.0));
        assert!((grid.top_edge_z() - 3.0).abs() < 1e-9);
    }
}
