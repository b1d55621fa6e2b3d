use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ijk {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl Ijk {
    pub const fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    pub const fn column(self) -> Column {
        Column::new(self.i, self.j)
    }
}

impl fmt::Display for Ijk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

impl From<[usize; 3]> for Ijk {
    fn from([i, j, k]: [usize; 3]) -> Self {
        Self::new(i, j, k)
    }
}

/// Physical position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Xyz {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }
}

impl fmt::Display for Xyz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// A vertical `(i, j)` column: the footprint of a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Column {
    pub i: usize,
    pub j: usize,
}

impl Column {
    pub const fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }

    /// The cell of this column at depth index `k`.
    pub const fn at(self, k: usize) -> Ijk {
        Ijk::new(self.i, self.j, k)
    }

    /// Chebyshev adjacency: the eight surrounding columns, not the column itself.
    pub const fn is_adjacent(self, other: Self) -> bool {
        let di = self.i.abs_diff(other.i);
        let dj = self.j.abs_diff(other.j);
        di <= 1 && dj <= 1 && (di + dj) > 0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_adjacency() {
        let c = Column::new(3, 3);
        assert!(c.is_adjacent(Column::new(2, 4)));
        assert!(c.is_adjacent(Column::new(3, 2)));
        assert!(!c.is_adjacent(c), "a column is not its own neighbor");
        assert!(!c.is_adjacent(Column::new(5, 3)));
    }

    #[test]
    fn test_distance() {
        let a = Xyz::new(0.0, 0.0, 0.0);
        let b = Xyz::new(3.0, 4.0, 12.0);
        assert!((a.distance(&b) - 13.0).abs() < 1e-12);
    }
}
