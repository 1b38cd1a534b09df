//! Normal statistics over grid windows.

use nalgebra::Vector3;

use planeseg_types::{Cloud, GridRect};

/// First and second moments of the valid normals in a window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionMoments {
    /// Number of valid normals.
    pub count: usize,
    /// Sum of the normals.
    pub sum: Vector3<f64>,
    /// Per-component sum of squares.
    pub sum_sq: Vector3<f64>,
}

impl RegionMoments {
    /// Fold one normal in.
    #[inline]
    pub fn add(&mut self, n: &Vector3<f64>) {
        self.count += 1;
        self.sum += n;
        self.sum_sq += n.component_mul(n);
    }

    /// Combine with another window's moments.
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    /// Unit mean normal, or `None` when empty or the normals cancel out.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn mean_normal(&self) -> Option<Vector3<f32>> {
        if self.count == 0 {
            return None;
        }
        let mean = self.sum / self.count as f64;
        let len = mean.norm();
        (len > 1e-9).then(|| (mean / len).cast::<f32>())
    }

    /// Per-component standard deviation of the normals.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn std_dev(&self) -> Vector3<f32> {
        if self.count == 0 {
            return Vector3::zeros();
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let var = self.sum_sq / n - mean.component_mul(&mean);
        var.map(|v| v.max(0.0).sqrt() as f32)
    }
}

/// Moments of the valid normals of `normals` inside `rect`.
///
/// Rows are accumulated in order, so the result does not depend on how
/// windows are scheduled.
#[must_use]
pub fn window_moments(normals: &Cloud, rect: GridRect) -> RegionMoments {
    let mut total = RegionMoments::default();
    for row in rect.y..rect.bottom() {
        let mut row_moments = RegionMoments::default();
        let start = normals.index(rect.x, row);
        for p in &normals.points[start..start + rect.width] {
            if p.has_valid_normal() {
                row_moments.add(&p.coords().cast::<f64>());
            }
        }
        total.merge(&row_moments);
    }
    total
}

/// Sum of `acos(n · mean)` over the valid normals inside `rect`.
#[must_use]
pub fn window_deviation_sum(normals: &Cloud, rect: GridRect, mean: &Vector3<f32>) -> f64 {
    let mean = mean.cast::<f64>();
    let mut total = 0.0;
    for row in rect.y..rect.bottom() {
        let start = normals.index(rect.x, row);
        let row_sum: f64 = normals.points[start..start + rect.width]
            .iter()
            .filter(|p| p.has_valid_normal())
            .map(|p| p.coords().cast::<f64>().dot(&mean).clamp(-1.0, 1.0).acos())
            .sum();
        total += row_sum;
    }
    total
}
