//! Closed-form eigen analysis of 3×3 covariance matrices.
//!
//! The device shader implements the same steps in WGSL, so host and device
//! normals agree to within `f32` rounding.

use nalgebra::{Matrix3, Vector3};

/// Middle eigenvalue below this fraction of the largest marks a line-like
/// (rank-deficient) neighbourhood.
///
/// Covariance normals test it through [`second_invariant`], which stays
/// accurate for near rank-one matrices where the trigonometric middle
/// eigenvalue does not.
pub const RANK_RATIO: f32 = 1e-5;

/// Smallest magnitude treated as non-zero after scaling.
const TINY: f32 = 1e-20;

/// Mean-centred covariance of `points`.
///
/// Returns `None` for fewer than three points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn covariance(points: &[Vector3<f32>]) -> Option<Matrix3<f32>> {
    if points.len() < 3 {
        return None;
    }
    let inv = 1.0 / points.len() as f32;
    let centroid = points.iter().sum::<Vector3<f32>>() * inv;
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    Some(cov * inv)
}

/// Sum of the principal 2×2 minors of a symmetric matrix.
///
/// Equals `λ0·λ1 + λ0·λ2 + λ1·λ2`, so for a covariance with a negligible
/// smallest eigenvalue it is the product of the other two. It is exactly
/// zero for an exactly rank-one matrix.
#[must_use]
pub fn second_invariant(m: &Matrix3<f32>) -> f32 {
    m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(0, 1)] + m[(0, 0)] * m[(2, 2)]
        - m[(0, 2)] * m[(0, 2)]
        + m[(1, 1)] * m[(2, 2)]
        - m[(1, 2)] * m[(1, 2)]
}

/// Eigenvalues of a symmetric matrix in ascending order.
///
/// Uses the trigonometric solution of the characteristic cubic. Returns
/// `None` when all three eigenvalues coincide.
#[must_use]
pub fn eigenvalues(m: &Matrix3<f32>) -> Option<[f32; 3]> {
    let p1 = m[(0, 1)].powi(2) + m[(0, 2)].powi(2) + m[(1, 2)].powi(2);
    let q = m.trace() / 3.0;
    let p2 = (m[(0, 0)] - q).powi(2) + (m[(1, 1)] - q).powi(2) + (m[(2, 2)] - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    if p <= TINY {
        return None;
    }
    let b = (m - Matrix3::identity() * q) / p;
    let r = (b.determinant() * 0.5).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;
    let largest = 2.0f32.mul_add(p * phi.cos(), q);
    let smallest = 2.0f32.mul_add(p * (phi + 2.0 * std::f32::consts::FRAC_PI_3).cos(), q);
    let middle = 3.0f32.mul_add(q, -largest - smallest);
    Some([smallest, middle, largest])
}

/// Unit eigenvector of the smallest eigenvalue of a covariance matrix.
///
/// Returns `None` for degenerate neighbourhoods: all points coincident,
/// isotropic spread, or points on a line.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use planeseg_normals::eigen::{covariance, smallest_eigenvector};
///
/// let points = [
///     Vector3::new(0.0, 0.0, 1.0),
///     Vector3::new(1.0, 0.0, 1.0),
///     Vector3::new(0.0, 1.0, 1.0),
///     Vector3::new(1.0, 1.0, 1.0),
/// ];
/// let cov = covariance(&points).unwrap();
/// let n = smallest_eigenvector(&cov).unwrap();
/// assert!((n.z.abs() - 1.0).abs() < 1e-5);
/// ```
#[must_use]
pub fn smallest_eigenvector(cov: &Matrix3<f32>) -> Option<Vector3<f32>> {
    let scale = cov.amax();
    if scale <= TINY {
        return None;
    }
    let m = cov / scale;
    let [smallest, _, largest] = eigenvalues(&m)?;
    if largest <= TINY || second_invariant(&m) <= RANK_RATIO * largest * largest {
        return None;
    }

    let a = m - Matrix3::identity() * smallest;
    let r0 = a.row(0).transpose();
    let r1 = a.row(1).transpose();
    let r2 = a.row(2).transpose();
    let candidates = [r0.cross(&r1), r0.cross(&r2), r1.cross(&r2)];

    let mut best = candidates[0];
    for c in &candidates[1..] {
        if c.norm_squared() > best.norm_squared() {
            best = *c;
        }
    }
    let len = best.norm();
    if len <= TINY {
        return None;
    }
    Some(best / len)
}
