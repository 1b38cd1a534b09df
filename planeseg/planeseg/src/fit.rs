//! Least-squares plane fit over merged regions.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use tracing::debug;

use planeseg_merge::MergedRegion;
use planeseg_normals::eigen::RANK_RATIO;
use planeseg_types::{Cloud, Plane, Point3};

use crate::config::PlaneFitParams;

/// Finite points of `cloud` inside the member windows of `group`.
fn support_points(cloud: &Cloud, group: &MergedRegion) -> Vec<Vector3<f64>> {
    let mut points = Vec::with_capacity(group.area());
    for region in &group.regions {
        let rect = region.rect;
        for row in rect.y..rect.bottom() {
            for col in rect.x..rect.right() {
                if let Some(p) = cloud.get(col, row).filter(|p| p.is_finite()) {
                    points.push(p.coords().cast::<f64>());
                }
            }
        }
    }
    points
}

/// Fit one plane, or `None` below the support floor.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn fit_group(cloud: &Cloud, group: &MergedRegion, min_support: usize) -> Option<Plane> {
    let points = support_points(cloud, group);
    if points.len() < min_support {
        return None;
    }

    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector3<f64>>() / n;
    let covariance = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    }) / n;

    let reference = group.normal.cast::<f64>();
    let eigen = SymmetricEigen::new(covariance);
    let mut sorted = [eigen.eigenvalues[0], eigen.eigenvalues[1], eigen.eigenvalues[2]];
    sorted.sort_unstable_by(f64::total_cmp);

    let fitted = eigen
        .eigenvectors
        .column(eigen.eigenvalues.imin())
        .into_owned()
        .normalize();
    let mut normal = if sorted[2] > 0.0 && sorted[1] > f64::from(RANK_RATIO) * sorted[2] {
        fitted
    } else {
        // Collinear or coincident support: keep the group's normal if it has one.
        reference.try_normalize(1e-12).unwrap_or(fitted)
    };
    if normal.dot(&reference) < 0.0 {
        normal = -normal;
    }

    let offset = -normal.dot(&centroid);
    let mean_sq = points
        .iter()
        .map(|p| {
            let d = normal.dot(p) + offset;
            d * d
        })
        .sum::<f64>()
        / n;

    let centroid = Point3::from(centroid.cast::<f32>());
    let normal = normal.cast::<f32>();
    Some(Plane {
        normal,
        offset: -normal.dot(&centroid.coords),
        centroid,
        support: points.len(),
        rms_distance: mean_sq.sqrt() as f32,
        dsv: group.dsv,
        bounds: group.bounds,
        regions: group.regions.clone(),
    })
}

/// Fit a plane to every merged group, in group order.
///
/// Groups with fewer than `params.min_support_points` finite points are
/// dropped.
pub(crate) fn fit_planes(cloud: &Cloud, groups: &[MergedRegion], params: &PlaneFitParams) -> Vec<Plane> {
    let min_support = params.min_support_points;
    let planes: Vec<Plane> = if params.parallel {
        groups
            .par_iter()
            .filter_map(|group| fit_group(cloud, group, min_support))
            .collect()
    } else {
        groups
            .iter()
            .filter_map(|group| fit_group(cloud, group, min_support))
            .collect()
    };

    debug!(
        groups = groups.len(),
        planes = planes.len(),
        dropped = groups.len() - planes.len(),
        "Planes fitted"
    );
    planes
}
