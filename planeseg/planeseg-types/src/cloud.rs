//! Organized point cloud.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SegError, SegResult};
use crate::point::Point;

/// A row-major grid of points with a sensor origin.
///
/// Invalid cells keep their slot in the grid so that grid adjacency keeps
/// approximating spatial adjacency. The same type holds normal clouds, where
/// each cell is a normal entry (see [`Point`]).
///
/// # Example
///
/// ```
/// use planeseg_types::{Cloud, Point};
///
/// let cloud = Cloud::from_fn(4, 3, |col, row| Point::new(col as f32, row as f32, 0.0));
/// assert!(cloud.is_organized());
/// assert_eq!(cloud.get(3, 2).map(|p| p.x), Some(3.0));
/// assert!(cloud.get(4, 0).is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cloud {
    /// Cells in row-major order: `points[row * width + col]`.
    pub points: Vec<Point>,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Sensor position, used as the default normal orientation target.
    pub sensor_origin: Point3<f32>,
}

impl Default for Cloud {
    fn default() -> Self {
        Self::new()
    }
}

impl Cloud {
    /// Create an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            width: 0,
            height: 0,
            sensor_origin: Point3::origin(),
        }
    }

    /// Create a `width × height` cloud with every cell invalid.
    #[must_use]
    pub fn invalid(width: usize, height: usize) -> Self {
        Self {
            points: vec![Point::invalid(); width * height],
            width,
            height,
            sensor_origin: Point3::origin(),
        }
    }

    /// Create a cloud by evaluating `f(col, row)` for every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> Point) -> Self {
        let mut points = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                points.push(f(col, row));
            }
        }
        Self {
            points,
            width,
            height,
            sensor_origin: Point3::origin(),
        }
    }

    /// Create an unorganized (`n × 1`) cloud from a point list.
    #[must_use]
    pub fn unorganized(points: Vec<Point>) -> Self {
        let width = points.len();
        Self {
            points,
            width,
            height: 1,
            sensor_origin: Point3::origin(),
        }
    }

    /// Set the sensor origin.
    #[must_use]
    pub fn with_sensor_origin(mut self, origin: Point3<f32>) -> Self {
        self.sensor_origin = origin;
        self
    }

    /// Number of cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no cells.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the point count matches `width × height`.
    #[must_use]
    pub fn has_valid_size(&self) -> bool {
        self.points.len() == self.width * self.height
    }

    /// Whether the cloud is laid out as a 2-D grid.
    ///
    /// A single point counts as organized; any other `n × 1` or `1 × n` cloud
    /// does not.
    #[must_use]
    pub const fn is_organized(&self) -> bool {
        (self.width > 1 && self.height > 1) || (self.width == 1 && self.height == 1)
    }

    /// Row-major index of `(col, row)`.
    #[inline]
    #[must_use]
    pub const fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// The cell at `(col, row)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, col: usize, row: usize) -> Option<&Point> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.points.get(self.index(col, row))
    }

    /// Number of cells with finite coordinates.
    #[must_use]
    pub fn finite_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_finite()).count()
    }

    /// Number of cells holding a valid normal.
    #[must_use]
    pub fn valid_normal_count(&self) -> usize {
        self.points.iter().filter(|p| p.has_valid_normal()).count()
    }

    /// Check that the cloud is non-empty and consistently sized.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::DataShape`] if the cloud is empty or the point
    /// count differs from `width × height`.
    pub fn validate_shape(&self) -> SegResult<()> {
        if self.points.is_empty() {
            return Err(SegError::data_shape("point cloud is empty"));
        }
        if !self.has_valid_size() {
            return Err(SegError::data_shape(format!(
                "{} points for a {}x{} grid",
                self.points.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Like [`Cloud::validate_shape`], additionally requiring a 2-D layout.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::DataShape`] if the cloud is malformed or not organized.
    pub fn validate_organized(&self) -> SegResult<()> {
        self.validate_shape()?;
        if !self.is_organized() {
            return Err(SegError::data_shape(format!(
                "cloud of {}x{} is not organized",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// An invalid-normal cloud with this cloud's grid and sensor origin.
    #[must_use]
    pub fn normal_cloud_like(&self) -> Self {
        Self {
            points: vec![Point::invalid_normal(); self.points.len()],
            width: self.width,
            height: self.height,
            sensor_origin: self.sensor_origin,
        }
    }

    /// Clear all points and dimensions.
    pub fn reset(&mut self) {
        self.points.clear();
        self.width = 0;
        self.height = 0;
        self.sensor_origin = Point3::origin();
    }

    /// Approximate equality of grids, origins and every cell.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.sensor_origin - other.sensor_origin).amax() <= epsilon
            && self.points.len() == other.points.len()
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|(a, b)| a.approx_eq(b, epsilon))
    }
}
