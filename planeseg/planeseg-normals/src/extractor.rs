//! Normal extraction over organized clouds.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use planeseg_types::{Cloud, EPSILON, Point, SegError, SegResult};

use crate::eigen::{covariance, smallest_eigenvector};
use crate::grid::{cell_distance, for_each_in_window, neighbor_levels};

/// Estimates one surface normal per valid point of an organized cloud.
///
/// Neighbours are searched in a circular grid window sized so that it spans
/// `search_radius` at the cloud's cell spacing. The normal is the smallest
/// eigenvector of the neighbourhood covariance.
///
/// # Example
///
/// ```
/// use planeseg_normals::NormalExtractor;
/// use planeseg_types::{Cloud, Point};
///
/// let cloud = Cloud::from_fn(16, 16, |c, r| Point::new(c as f32 * 0.1, r as f32 * 0.1, 2.0));
/// let extractor = NormalExtractor::default().with_search_radius(0.25);
///
/// let mut normals = Cloud::new();
/// extractor.estimate_normals(&cloud, &mut normals).unwrap();
///
/// // Oriented toward the sensor at the origin, i.e. facing -Z.
/// let n = normals.get(8, 8).unwrap();
/// assert!(n.has_valid_normal());
/// assert!((n.z + 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalExtractor {
    /// Neighbourhood radius in cloud units. Default: 0.5.
    pub search_radius: f32,

    /// Orient normals toward a view point. Default: true.
    pub flip_normals: bool,

    /// Explicit view point overriding the cloud's sensor origin.
    /// Default: `None`.
    pub flip_view_point: Option<Point3<f32>>,

    /// Use rayon across points. Default: true.
    pub parallel: bool,
}

impl Default for NormalExtractor {
    fn default() -> Self {
        Self {
            search_radius: 0.5,
            flip_normals: true,
            flip_view_point: None,
            parallel: true,
        }
    }
}

impl NormalExtractor {
    /// Set the search radius.
    #[must_use]
    pub const fn with_search_radius(mut self, radius: f32) -> Self {
        self.search_radius = radius;
        self
    }

    /// Enable or disable normal orientation.
    #[must_use]
    pub const fn with_flip_normals(mut self, flip: bool) -> Self {
        self.flip_normals = flip;
        self
    }

    /// Orient normals toward `view_point` instead of the sensor origin.
    #[must_use]
    pub const fn with_flip_view_point(mut self, view_point: Point3<f32>) -> Self {
        self.flip_view_point = Some(view_point);
        self
    }

    /// Enable or disable parallel extraction.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] if the search radius is not a
    /// finite value above [`EPSILON`], or the view point is not finite.
    pub fn validate(&self) -> SegResult<()> {
        if !self.search_radius.is_finite() || self.search_radius <= EPSILON {
            return Err(SegError::configuration(format!(
                "search radius must be positive, got {}",
                self.search_radius
            )));
        }
        if let Some(vp) = self.flip_view_point {
            if !vp.coords.iter().all(|v| v.is_finite()) {
                return Err(SegError::configuration("flip view point must be finite"));
            }
        }
        Ok(())
    }

    /// The point normals are oriented toward, or `None` when flipping is off.
    #[must_use]
    pub fn view_point_for(&self, cloud: &Cloud) -> Option<Point3<f32>> {
        self.flip_normals
            .then(|| self.flip_view_point.unwrap_or(cloud.sensor_origin))
    }

    /// Window radius in cells for `cloud`.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration and
    /// [`SegError::DataShape`] for an empty, mis-sized or unorganized cloud.
    pub fn neighbor_levels_for(&self, cloud: &Cloud) -> SegResult<usize> {
        self.validate()?;
        cloud.validate_organized()?;
        let spacing = cell_distance(cloud);
        if spacing <= 0.0 && cloud.finite_count() > 1 {
            warn!("cell distance could not be estimated, using a one-cell window");
        }
        Ok(neighbor_levels(self.search_radius, spacing))
    }

    /// Estimate normals of `input` into `output`.
    ///
    /// `output` takes the input's grid and sensor origin. Cells whose point is
    /// invalid, or whose neighbourhood is degenerate, get an invalid normal
    /// (zero vector, `aux = 0`). `output` is only written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration and
    /// [`SegError::DataShape`] for an empty, mis-sized or unorganized cloud.
    pub fn estimate_normals(&self, input: &Cloud, output: &mut Cloud) -> SegResult<()> {
        let levels = self.neighbor_levels_for(input)?;
        let view_point = self.view_point_for(input);
        let (width, height) = (input.width, input.height);
        let points = &input.points;

        debug!(
            width,
            height,
            levels,
            flip = view_point.is_some(),
            "Estimating normals"
        );

        let window = Window {
            width,
            height,
            levels,
            radius_sq: self.search_radius * self.search_radius,
            view_point,
        };
        let normals: Vec<Point> = if self.parallel {
            (0..points.len())
                .into_par_iter()
                .map_init(Vec::new, |scratch, index| window.normal_at(points, index, scratch))
                .collect()
        } else {
            let mut scratch = Vec::new();
            (0..points.len())
                .map(|index| window.normal_at(points, index, &mut scratch))
                .collect()
        };

        let valid = normals.iter().filter(|n| n.has_valid_normal()).count();
        debug!(valid, total = normals.len(), "Normals estimated");

        *output = Cloud {
            points: normals,
            width,
            height,
            sensor_origin: input.sensor_origin,
        };
        Ok(())
    }
}

/// Neighbourhood shape shared by every cell of one extraction.
#[derive(Clone, Copy)]
struct Window {
    width: usize,
    height: usize,
    levels: usize,
    /// Squared 3-D search radius around the centre point.
    radius_sq: f32,
    view_point: Option<Point3<f32>>,
}

impl Window {
    /// Normal of the cell at `index`, oriented toward the view point when set.
    ///
    /// Only finite window points within the search radius of the centre
    /// contribute, so a depth step inside the window does not bend the normal.
    fn normal_at(&self, points: &[Point], index: usize, scratch: &mut Vec<Vector3<f32>>) -> Point {
        let center = &points[index];
        if !center.is_finite() {
            return Point::invalid_normal();
        }
        let c = center.coords();

        scratch.clear();
        for_each_in_window(
            self.width,
            self.height,
            index % self.width,
            index / self.width,
            self.levels,
            |i| {
                let p = &points[i];
                if p.is_finite() && (p.coords() - c).norm_squared() <= self.radius_sq {
                    scratch.push(p.coords());
                }
            },
        );

        let Some(mut normal) = covariance(scratch).and_then(|cov| smallest_eigenvector(&cov)) else {
            return Point::invalid_normal();
        };
        if normal.amax() <= EPSILON {
            return Point::invalid_normal();
        }

        if let Some(vp) = self.view_point {
            if (vp.coords - c).dot(&normal) < 0.0 {
                normal = -normal;
            }
        }
        Point::normal(normal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_cloud(width: usize, height: usize) -> Cloud {
        Cloud::from_fn(width, height, |c, r| {
            Point::new(c as f32 * 0.1, r as f32 * 0.1, 3.0)
        })
    }

    #[test]
    fn test_defaults() {
        let e = NormalExtractor::default();
        assert_relative_eq!(e.search_radius, 0.5);
        assert!(e.flip_normals);
        assert!(e.flip_view_point.is_none());
        assert!(e.validate().is_ok());
    }

    #[test]
    fn test_invalid_radius() {
        for radius in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = NormalExtractor::default()
                .with_search_radius(radius)
                .validate()
                .unwrap_err();
            assert!(matches!(err, SegError::Configuration { .. }));
        }
    }

    #[test]
    fn test_shape_errors_leave_output_untouched() {
        let extractor = NormalExtractor::default();
        let mut output = plane_cloud(2, 2);
        let before = output.clone();

        let mut bad = plane_cloud(4, 4);
        bad.points.pop();
        assert!(matches!(
            extractor.estimate_normals(&bad, &mut output),
            Err(SegError::DataShape { .. })
        ));
        assert!(extractor.estimate_normals(&Cloud::new(), &mut output).is_err());
        let row = Cloud::unorganized(vec![Point::new(0.0, 0.0, 0.0); 8]);
        assert!(extractor.estimate_normals(&row, &mut output).is_err());

        assert_eq!(output, before);
    }

    #[test]
    fn test_flat_plane_faces_sensor() {
        let cloud = plane_cloud(12, 12);
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_search_radius(0.2)
            .estimate_normals(&cloud, &mut normals)
            .unwrap();

        assert_eq!((normals.width, normals.height), (12, 12));
        assert_eq!(normals.valid_normal_count(), 144);
        for n in &normals.points {
            assert_relative_eq!(n.z, -1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_flip_view_point_override() {
        let cloud = plane_cloud(8, 8);
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_search_radius(0.2)
            .with_flip_view_point(Point3::new(0.0, 0.0, 100.0))
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert!(normals.points.iter().all(|n| n.z > 0.99));
    }

    #[test]
    fn test_no_flip_keeps_consistent_axis() {
        let cloud = plane_cloud(8, 8);
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_flip_normals(false)
            .with_search_radius(0.2)
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert!(normals.points.iter().all(|n| n.z.abs() > 0.99));
    }

    #[test]
    fn test_invalid_points_get_invalid_normals() {
        let mut cloud = plane_cloud(8, 8);
        let hole = cloud.index(3, 3);
        cloud.points[hole] = Point::invalid();
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_search_radius(0.2)
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert!(!normals.points[hole].has_valid_normal());
        assert_eq!(normals.valid_normal_count(), 63);
    }

    #[test]
    fn test_all_invalid_cloud() {
        let cloud = Cloud::invalid(6, 6);
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert_eq!(normals.len(), 36);
        assert_eq!(normals.valid_normal_count(), 0);
    }

    #[test]
    fn test_single_point_cloud() {
        let cloud = Cloud::from_fn(1, 1, |_, _| Point::new(1.0, 2.0, 3.0));
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert_eq!(normals.len(), 1);
        assert!(!normals.points[0].has_valid_normal());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cloud = Cloud::from_fn(20, 15, |c, r| {
            let (x, y) = (c as f32 * 0.05, r as f32 * 0.05);
            Point::new(x, y, 1.0 + 0.3 * x * x - 0.2 * y)
        });
        let extractor = NormalExtractor::default().with_search_radius(0.12);
        let mut a = Cloud::new();
        let mut b = Cloud::new();
        extractor.estimate_normals(&cloud, &mut a).unwrap();
        extractor
            .clone()
            .with_parallel(false)
            .estimate_normals(&cloud, &mut b)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_step_is_outside_radius() {
        // Near wall at z = 1 for the left half, far wall at z = 5 for the
        // right half. The grid window reaches across the step.
        let cloud = Cloud::from_fn(20, 20, |c, r| {
            let z = if c < 10 { 1.0 } else { 5.0 };
            Point::new(c as f32 * 0.1, r as f32 * 0.1, z)
        });
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_search_radius(0.3)
            .estimate_normals(&cloud, &mut normals)
            .unwrap();

        assert_eq!(normals.valid_normal_count(), 400);
        for col in [8, 9, 10, 11] {
            let n = &normals.points[cloud.index(col, 10)];
            assert!(n.z.abs() > 0.999, "column {col}: {n:?}");
        }
    }

    #[test]
    fn test_isolated_point_has_no_normal() {
        // Every neighbour lies a full metre away in depth.
        let cloud = Cloud::from_fn(5, 5, |c, r| {
            let z = if (c, r) == (2, 2) { 2.0 } else { 1.0 };
            Point::new(c as f32 * 0.1, r as f32 * 0.1, z)
        });
        let mut normals = Cloud::new();
        NormalExtractor::default()
            .with_search_radius(0.25)
            .estimate_normals(&cloud, &mut normals)
            .unwrap();
        assert!(!normals.points[cloud.index(2, 2)].has_valid_normal());
        assert!(normals.points[cloud.index(0, 0)].has_valid_normal());
    }
}
