//! Rectangular grid windows and their normal statistics.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned window of grid cells.
///
/// `x` and `width` count columns, `y` and `height` count rows.
///
/// # Example
///
/// ```
/// use planeseg_types::GridRect;
///
/// let left = GridRect::new(0, 0, 4, 4);
/// let right = GridRect::new(4, 2, 4, 4);
/// let diagonal = GridRect::new(4, 4, 2, 2);
///
/// assert!(left.touches(&right));
/// assert!(!left.touches(&diagonal));
/// assert_eq!(left.union(&right), GridRect::new(0, 0, 8, 6));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridRect {
    /// First column.
    pub x: usize,
    /// First row.
    pub y: usize,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl GridRect {
    /// Create a window.
    #[inline]
    #[must_use]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of cells covered.
    #[inline]
    #[must_use]
    pub const fn area(&self) -> usize {
        self.width * self.height
    }

    /// One past the last column.
    #[inline]
    #[must_use]
    pub const fn right(&self) -> usize {
        self.x + self.width
    }

    /// One past the last row.
    #[inline]
    #[must_use]
    pub const fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Whether `(col, row)` lies inside the window.
    #[inline]
    #[must_use]
    pub const fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.x && col < self.right() && row >= self.y && row < self.bottom()
    }

    /// Whether two windows share any cell.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Whether two windows share an edge segment of positive length.
    ///
    /// Windows meeting only at a corner do not touch.
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        let rows_overlap = self.y < other.bottom() && other.y < self.bottom();
        let cols_overlap = self.x < other.right() && other.x < self.right();
        let side_by_side = self.right() == other.x || other.right() == self.x;
        let stacked = self.bottom() == other.y || other.bottom() == self.y;
        (side_by_side && rows_overlap) || (stacked && cols_overlap)
    }

    /// Smallest window covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// A grid window with aggregate statistics over its valid normals.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalRegion {
    /// Window in the grid.
    pub rect: GridRect,
    /// Unit mean normal.
    pub normal: Vector3<f32>,
    /// Per-axis standard deviation of the normal components.
    pub std_dev: Vector3<f32>,
    /// Mean angular deviation from `normal`, in radians.
    pub dsv: f32,
    /// Number of valid normals inside the window.
    pub valid_count: usize,
}

impl NormalRegion {
    /// Number of cells covered.
    #[inline]
    #[must_use]
    pub const fn area(&self) -> usize {
        self.rect.area()
    }

    /// Whether two regions share an edge.
    #[inline]
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        self.rect.touches(&other.rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_vertical() {
        let top = GridRect::new(0, 0, 4, 2);
        let bottom = GridRect::new(2, 2, 4, 2);
        assert!(top.touches(&bottom));
        assert!(bottom.touches(&top));
    }

    #[test]
    fn test_touch_requires_overlap_on_shared_edge() {
        let a = GridRect::new(0, 0, 2, 2);
        let b = GridRect::new(2, 2, 2, 2);
        let c = GridRect::new(5, 0, 2, 2);
        assert!(!a.touches(&b));
        assert!(!a.touches(&c));
    }

    #[test]
    fn test_overlap_is_not_touch() {
        let a = GridRect::new(0, 0, 4, 4);
        let b = GridRect::new(2, 2, 4, 4);
        assert!(a.overlaps(&b));
        assert!(!a.touches(&b));
    }

    #[test]
    fn test_contains_and_extent() {
        let r = GridRect::new(1, 2, 3, 4);
        assert_eq!(r.area(), 12);
        assert_eq!((r.right(), r.bottom()), (4, 6));
        assert!(r.contains(1, 2));
        assert!(r.contains(3, 5));
        assert!(!r.contains(4, 5));
        assert!(!r.contains(0, 2));
    }
}
