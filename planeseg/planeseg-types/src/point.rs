//! Cloud point type.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance used for approximate comparisons and degeneracy checks.
pub const EPSILON: f32 = 1e-6;

/// A single cloud cell.
///
/// In a point cloud `x`, `y`, `z` are coordinates and invalid cells (sensor
/// dropouts) hold `NaN`. In a normal cloud they are the normal components and
/// `aux` is `1.0` for a valid normal, `0.0` for an invalid one.
///
/// The layout matches a WGSL `vec4<f32>`.
///
/// # Example
///
/// ```
/// use planeseg_types::Point;
///
/// let p = Point::new(1.0, 2.0, 3.0);
/// assert!(p.is_finite());
/// assert!(!Point::invalid().is_finite());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Point {
    /// X coordinate or normal component.
    pub x: f32,
    /// Y coordinate or normal component.
    pub y: f32,
    /// Z coordinate or normal component.
    pub z: f32,
    /// Auxiliary value; normal validity flag in normal clouds.
    pub aux: f32,
}

impl Default for Point {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Point {
    /// Create a point with `aux = 0`.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, aux: 0.0 }
    }

    /// An invalid point (all coordinates `NaN`).
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            x: f32::NAN,
            y: f32::NAN,
            z: f32::NAN,
            aux: 0.0,
        }
    }

    /// A valid normal entry (`aux = 1`).
    #[inline]
    #[must_use]
    pub fn normal(n: Vector3<f32>) -> Self {
        Self {
            x: n.x,
            y: n.y,
            z: n.z,
            aux: 1.0,
        }
    }

    /// An invalid normal entry: zero vector with `aux = 0`.
    #[inline]
    #[must_use]
    pub const fn invalid_normal() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            aux: 0.0,
        }
    }

    /// Whether all three coordinates are finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Whether this entry holds a valid normal.
    #[inline]
    #[must_use]
    pub fn has_valid_normal(&self) -> bool {
        self.aux > 0.5 && self.is_finite()
    }

    /// Coordinates as a vector.
    #[inline]
    #[must_use]
    pub const fn coords(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Coordinates as a position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Point3<f32> {
        Point3::new(self.x, self.y, self.z)
    }

    /// Approximate equality.
    ///
    /// Two non-finite points compare equal so that invalid cells match.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        match (self.is_finite(), other.is_finite()) {
            (true, true) => {
                (self.x - other.x).abs() <= epsilon
                    && (self.y - other.y).abs() <= epsilon
                    && (self.z - other.z).abs() <= epsilon
                    && (self.aux - other.aux).abs() <= epsilon
            }
            (false, false) => true,
            _ => false,
        }
    }
}

impl From<Point3<f32>> for Point {
    fn from(p: Point3<f32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}
