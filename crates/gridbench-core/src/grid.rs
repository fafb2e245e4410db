//! Grid type and comparator
//!
//! A grid is a rectangular matrix of non-negative integers. Grids arrive from
//! untrusted places (datasets, model output, generated code), so construction
//! is fallible and deserialization enforces the shape invariant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Raw row-major cells as they appear on the wire
pub type Rows = Vec<Vec<i64>>;

/// Rectangular, non-empty matrix of non-negative integers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Rows", into = "Rows")]
pub struct Grid(Rows);

impl Grid {
    /// Number of rows
    pub fn height(&self) -> usize {
        self.0.len()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.0.first().map(Vec::len).unwrap_or(0)
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[Vec<i64>] {
        &self.0
    }

    /// Take the rows
    pub fn into_rows(self) -> Rows {
        self.0
    }

    /// Cell at (row, col), if in bounds
    pub fn get(&self, row: usize, col: usize) -> Option<i64> {
        self.0.get(row).and_then(|r| r.get(col)).copied()
    }
}

impl TryFrom<Rows> for Grid {
    type Error = GridError;

    fn try_from(rows: Rows) -> Result<Self, Self::Error> {
        let expected = rows.first().ok_or(GridError::Empty)?.len();
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != expected {
                return Err(GridError::Ragged {
                    row,
                    expected,
                    found: cells.len(),
                });
            }
            if let Some((col, &value)) = cells.iter().enumerate().find(|(_, v)| **v < 0) {
                return Err(GridError::Negative { row, col, value });
            }
        }
        Ok(Self(rows))
    }
}

impl From<Grid> for Rows {
    fn from(grid: Grid) -> Self {
        grid.0
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let line: Vec<String> = row.iter().map(i64::to_string).collect();
            write!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// Structural equality of two row-major matrices.
///
/// True iff both have the same number of rows, each row pair has the same
/// length, and every cell pair is equal. Ragged or differently shaped input
/// compares unequal.
pub fn grids_equal<T: PartialEq>(a: &[Vec<T>], b: &[Vec<T>]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(ra, rb)| ra.len() == rb.len() && ra.iter().zip(rb).all(|(x, y)| x == y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: Rows) -> Grid {
        Grid::try_from(rows).unwrap()
    }

    #[test]
    fn test_try_from_valid() {
        let g = grid(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(g.height(), 2);
        assert_eq!(g.width(), 3);
        assert_eq!(g.get(1, 2), Some(6));
        assert_eq!(g.get(2, 0), None);
    }

    #[test]
    fn test_try_from_rejects_bad_shapes() {
        assert_eq!(Grid::try_from(Rows::new()), Err(GridError::Empty));
        assert_eq!(
            Grid::try_from(vec![vec![1, 2], vec![3]]),
            Err(GridError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            Grid::try_from(vec![vec![0, -1]]),
            Err(GridError::Negative {
                row: 0,
                col: 1,
                value: -1
            })
        );
    }

    #[test]
    fn test_deserialize_enforces_invariant() {
        let ok: Grid = serde_json::from_str("[[1,2],[3,4]]").unwrap();
        assert_eq!(ok.clone().into_rows(), vec![vec![1, 2], vec![3, 4]]);

        assert!(serde_json::from_str::<Grid>("[[1,2],[3]]").is_err());
        assert!(serde_json::from_str::<Grid>("[]").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "[[1,2],[3,4]]");
    }

    #[test]
    fn test_grids_equal_reflexive_and_symmetric() {
        let a = vec![vec![1, 2], vec![3, 4]];
        let b = vec![vec![1, 2], vec![3, 5]];
        assert!(grids_equal(&a, &a));
        assert!(!grids_equal(&a, &b));
        assert_eq!(grids_equal(&a, &b), grids_equal(&b, &a));
    }

    #[test]
    fn test_grids_equal_shape_mismatch() {
        let a = vec![vec![1, 2], vec![3, 4]];
        assert!(!grids_equal(&a, &[vec![1, 2]]));
        assert!(!grids_equal(&a, &[vec![1, 2], vec![3]]));
        assert!(!grids_equal(&[vec![1, 2], vec![3]], &a));
        assert!(!grids_equal(&[vec![1]], &[vec![1, 1]]));
        assert!(grids_equal::<i64>(&[], &[]));
    }

    #[test]
    fn test_display() {
        let g = grid(vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(g.to_string(), "0 1\n2 3");
    }
}
