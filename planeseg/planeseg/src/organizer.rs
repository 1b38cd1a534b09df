//! Gridding of unorganized clouds.

use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use planeseg_types::{Cloud, EPSILON, Point, SegError, SegResult};

/// Bins an unorganized cloud into an organized grid over its XY extent.
///
/// The cell size follows from the smallest XY distance between two points,
/// so that well-spaced scans map roughly one point per cell. When several
/// points land in one cell, the one with the largest `z` is kept. Cells
/// without a point are invalid.
///
/// # Example
///
/// ```
/// use planeseg::Organizer;
/// use planeseg_types::{Cloud, Point};
///
/// let scattered = Cloud::unorganized(vec![
///     Point::new(1.0, 0.0, 5.0),
///     Point::new(0.0, 0.0, 5.0),
///     Point::new(0.0, 1.0, 5.0),
///     Point::new(1.0, 1.0, 5.0),
/// ]);
///
/// let mut grid = Cloud::new();
/// Organizer::default().organize(&scattered, &mut grid).unwrap();
///
/// assert!(grid.is_organized());
/// assert_eq!(grid.finite_count(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Organizer {
    /// Maximum grid columns. Default: 2047.
    pub max_width: usize,

    /// Maximum grid rows. Default: 2047.
    pub max_height: usize,
}

impl Default for Organizer {
    fn default() -> Self {
        Self {
            max_width: 2047,
            max_height: 2047,
        }
    }
}

/// Number of cells covering `extent`, at most `max`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cells(extent: f32, cell: f32, max: usize) -> usize {
    let n = (extent / cell).floor();
    if n.is_finite() && n >= 0.0 && n < max as f32 {
        (n as usize + 1).min(max)
    } else {
        max
    }
}

/// Smallest XY distance between two of `points`.
///
/// Sweeps the points in X order and stops each scan once the X gap alone
/// exceeds the best distance.
fn min_xy_distance(points: &[Point]) -> f32 {
    let mut xy: Vec<(f32, f32)> = points.iter().map(|p| (p.x, p.y)).collect();
    xy.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let mut best = f32::INFINITY;
    for (i, a) in xy.iter().enumerate() {
        for b in &xy[i + 1..] {
            let dx = b.0 - a.0;
            if dx * dx >= best {
                break;
            }
            let dy = b.1 - a.1;
            best = best.min(dx.mul_add(dx, dy * dy));
        }
    }
    best.sqrt()
}

impl Organizer {
    /// Set the largest grid to build.
    #[must_use]
    pub const fn with_max_size(mut self, width: usize, height: usize) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] if a maximum dimension is zero.
    pub fn validate(&self) -> SegResult<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(SegError::configuration(format!(
                "organizer maximum size must be at least 1x1, got {}x{}",
                self.max_width, self.max_height
            )));
        }
        Ok(())
    }

    /// Grid `input` into `output`.
    ///
    /// Organized input is copied unchanged. Non-finite points are ignored;
    /// when none is finite, the result is a single invalid cell. The sensor
    /// origin is kept. `output` is only written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration and
    /// [`SegError::DataShape`] for an empty or mis-sized cloud.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn organize(&self, input: &Cloud, output: &mut Cloud) -> SegResult<()> {
        self.validate()?;
        input.validate_shape()?;

        if input.is_organized() {
            *output = input.clone();
            return Ok(());
        }

        let finite: Vec<Point> = input.points.iter().copied().filter(Point::is_finite).collect();
        if finite.len() < input.len() {
            debug!(
                dropped = input.len() - finite.len(),
                "Ignoring non-finite points while organizing"
            );
        }
        if finite.is_empty() {
            warn!(points = input.len(), "No finite points to organize");
            *output = Cloud::invalid(1, 1).with_sensor_origin(input.sensor_origin);
            return Ok(());
        }

        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for p in &finite {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        let (dx, dy) = (max_x - min_x, max_y - min_y);

        let min_distance = min_xy_distance(&finite);
        let (width, height) = if min_distance > EPSILON {
            (
                cells(dx, min_distance, self.max_width),
                cells(dy, min_distance, self.max_height),
            )
        } else {
            (self.max_width, self.max_height)
        };

        let cell = (dx / width as f32).max(dy / height as f32);
        let (width, height, inv) = if cell > EPSILON {
            (
                cells(dx, cell, self.max_width),
                cells(dy, cell, self.max_height),
                1.0 / cell,
            )
        } else {
            // Every point shares one XY position.
            (1, 1, 0.0)
        };

        let mut grid = Cloud::invalid(width, height).with_sensor_origin(input.sensor_origin);
        for p in &finite {
            let col = (((p.x - min_x) * inv) as usize).min(width - 1);
            let row = (((p.y - min_y) * inv) as usize).min(height - 1);
            let slot = &mut grid.points[row * width + col];
            if !slot.is_finite() || p.z > slot.z {
                *slot = *p;
            }
        }

        debug!(
            points = finite.len(),
            width,
            height,
            cell,
            filled = grid.finite_count(),
            "Cloud organized"
        );
        *output = grid;
        Ok(())
    }

    /// Flatten `input` into an `n × 1` cloud of its finite points.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::DataShape`] for a mis-sized cloud.
    pub fn disorganize(input: &Cloud, output: &mut Cloud) -> SegResult<()> {
        if !input.has_valid_size() {
            return Err(SegError::data_shape(format!(
                "cloud has {} points for a {}x{} grid",
                input.len(),
                input.width,
                input.height
            )));
        }
        let points: Vec<Point> = input.points.iter().copied().filter(Point::is_finite).collect();
        *output = Cloud::unorganized(points).with_sensor_origin(input.sensor_origin);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use planeseg_types::Point3;

    fn scattered_grid(cols: usize, rows: usize, spacing: f32) -> Cloud {
        let mut points = Vec::new();
        // Column-major with reversed rows, so input order differs from grid order.
        for c in 0..cols {
            for r in (0..rows).rev() {
                points.push(Point::new(c as f32 * spacing, r as f32 * spacing, 1.0));
            }
        }
        Cloud::unorganized(points)
    }

    #[test]
    fn test_organized_input_passes_through() {
        let cloud = Cloud::from_fn(3, 2, |c, r| Point::new(c as f32, r as f32, 0.0));
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();
        assert_eq!(out, cloud);
    }

    #[test]
    fn test_empty_input_is_error() {
        let mut out = Cloud::invalid(2, 2);
        let err = Organizer::default().organize(&Cloud::new(), &mut out).unwrap_err();
        assert!(matches!(err, SegError::DataShape { .. }));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_single_point() {
        let cloud = Cloud::unorganized(vec![Point::new(1.0, 2.0, 3.0)]);
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.points[0], Point::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_regular_grid_keeps_every_point() {
        let cloud = scattered_grid(5, 4, 0.5);
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();

        assert!(out.is_organized());
        assert!(out.width >= 5 && out.height >= 4);
        assert_eq!(out.finite_count(), 20);

        // Within a row, X grows with the column.
        for row in 0..out.height {
            let xs: Vec<f32> = (0..out.width)
                .filter_map(|col| out.get(col, row).filter(|p| p.is_finite()).map(|p| p.x))
                .collect();
            assert!(xs.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_collision_keeps_largest_z() {
        let cloud = Cloud::unorganized(vec![
            Point::new(0.0, 0.0, 1.0),
            Point::new(0.0, 0.0, 4.0),
            Point::new(0.0, 0.0, 2.0),
            Point::new(3.0, 3.0, 1.0),
        ]);
        let mut out = Cloud::new();
        Organizer::default()
            .with_max_size(8, 8)
            .organize(&cloud, &mut out)
            .unwrap();

        // Duplicates drive the minimum distance to zero, so the maximum grid is used.
        assert_eq!((out.width, out.height), (8, 8));
        assert_eq!(out.finite_count(), 2);
        assert_eq!(out.points[0].z, 4.0);
    }

    #[test]
    fn test_coincident_points_form_one_cell() {
        let cloud = Cloud::unorganized(vec![Point::new(1.0, 1.0, 1.0), Point::new(1.0, 1.0, 2.0)]);
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.points[0].z, 2.0);
    }

    #[test]
    fn test_size_is_capped() {
        let cloud = scattered_grid(40, 3, 0.25);
        let mut out = Cloud::new();
        Organizer::default()
            .with_max_size(10, 10)
            .organize(&cloud, &mut out)
            .unwrap();
        assert!(out.width <= 10 && out.height <= 10);
        assert!(out.finite_count() > 0);
    }

    #[test]
    fn test_non_finite_points_are_ignored() {
        let mut cloud = scattered_grid(3, 3, 1.0);
        cloud.points.push(Point::invalid());
        cloud.width += 1;
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();
        assert_eq!(out.finite_count(), 9);
    }

    #[test]
    fn test_all_non_finite_gives_invalid_cell() {
        let origin = Point3::new(0.0, 0.0, 1.0);
        let cloud = Cloud::unorganized(vec![Point::invalid(); 5]).with_sensor_origin(origin);
        let mut out = Cloud::new();
        Organizer::default().organize(&cloud, &mut out).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.finite_count(), 0);
        assert_eq!(out.sensor_origin, origin);
    }

    #[test]
    fn test_invalid_config() {
        let mut out = Cloud::new();
        let err = Organizer::default()
            .with_max_size(0, 4)
            .organize(&scattered_grid(2, 2, 1.0), &mut out)
            .unwrap_err();
        assert!(matches!(err, SegError::Configuration { .. }));
    }

    #[test]
    fn test_disorganize_keeps_finite_points() {
        let mut cloud = Cloud::from_fn(4, 3, |c, r| Point::new(c as f32, r as f32, 1.0));
        cloud.points[5] = Point::invalid();
        let mut out = Cloud::new();
        Organizer::disorganize(&cloud, &mut out).unwrap();
        assert_eq!((out.width, out.height), (11, 1));
        assert!(out.points.iter().all(Point::is_finite));
    }

    #[test]
    fn test_min_xy_distance() {
        let points = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(5.0, 0.0, 0.0),
            Point::new(5.0, 0.5, 9.0),
            Point::new(2.0, 2.0, 0.0),
        ];
        assert!((min_xy_distance(&points) - 0.5).abs() < 1e-6);
    }
}
