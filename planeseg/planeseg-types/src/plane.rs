//! Fitted plane model.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::{GridRect, NormalRegion};

/// A plane fitted to the support points of a merged region.
///
/// The plane is `normal · p + offset = 0` with a unit `normal`, and the
/// offset is consistent with the support centroid.
///
/// # Example
///
/// ```
/// use planeseg_types::{GridRect, Plane};
/// use nalgebra::{Point3, Vector3};
///
/// let plane = Plane {
///     normal: Vector3::z(),
///     offset: -2.0,
///     centroid: Point3::new(0.0, 0.0, 2.0),
///     support: 100,
///     rms_distance: 0.0,
///     dsv: 0.0,
///     bounds: GridRect::new(0, 0, 10, 10),
///     regions: Vec::new(),
/// };
///
/// assert!((plane.signed_distance(&Point3::new(5.0, 5.0, 3.0)) - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Plane {
    /// Unit plane normal.
    pub normal: Vector3<f32>,
    /// Plane offset, `-normal · centroid`.
    pub offset: f32,
    /// Centroid of the support points.
    pub centroid: Point3<f32>,
    /// Number of finite points used for the fit.
    pub support: usize,
    /// Root-mean-square distance of the support points to the plane.
    pub rms_distance: f32,
    /// Angular dispersion of the merged normals, in radians.
    pub dsv: f32,
    /// Bounding window of the member regions.
    pub bounds: GridRect,
    /// Regions merged into this plane.
    pub regions: Vec<NormalRegion>,
}

impl Plane {
    /// Signed distance from `point` to the plane.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3<f32>) -> f32 {
        self.normal.dot(&point.coords) + self.offset
    }

    /// Plane coefficients `[a, b, c, d]` with `ax + by + cz + d = 0`.
    #[must_use]
    pub fn coefficients(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.offset]
    }

    /// Number of grid cells covered by the member regions.
    #[must_use]
    pub fn area(&self) -> usize {
        self.regions.iter().map(NormalRegion::area).sum()
    }
}
