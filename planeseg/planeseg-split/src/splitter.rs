//! Level-synchronous splitting of a normal cloud.

use rayon::prelude::*;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use planeseg_types::{Cloud, EPSILON, GridRect, NormalRegion, SegError, SegResult};

use crate::stats::{RegionMoments, window_deviation_sum, window_moments};

/// Outcome of evaluating one pending window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitDecision {
    /// No valid normals, or normals that cancel out: dropped.
    Discard,
    /// Homogeneous or too small to halve: emitted.
    Leaf(NormalRegion),
    /// Halved into two windows.
    Split(GridRect, GridRect),
}

/// Grid axis cut by a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Cut between columns (left and right halves).
    Columns,
    /// Cut between rows (top and bottom halves).
    Rows,
}

/// Recursively halves a normal cloud until every window is homogeneous.
///
/// A window is emitted as a [`NormalRegion`] when its mean angular deviation
/// (dsv) is at most `std_dsv_threshold`, or when it cannot be halved without
/// a half falling below `min_width × min_height`. Windows without valid
/// normals are dropped.
///
/// # Split Policy
///
/// The longer axis is halved (columns when `width > height`, rows
/// otherwise). When that axis is too short, the other axis is halved.
/// Leaves are reported sorted by `(y, x)`, independent of evaluation order.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use planeseg_split::NormalSplitter;
/// use planeseg_types::{Cloud, Point};
///
/// // Left half faces +Z, right half faces +X.
/// let normals = Cloud::from_fn(16, 8, |c, _| {
///     Point::normal(if c < 8 { Vector3::z() } else { Vector3::x() })
/// });
///
/// let mut regions = Vec::new();
/// NormalSplitter::default().split(&normals, &mut regions).unwrap();
///
/// assert_eq!(regions.len(), 2);
/// assert_eq!(regions[0].rect.width, 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalSplitter {
    /// Minimum region width in cells. Default: 2.
    pub min_width: usize,

    /// Minimum region height in cells. Default: 2.
    pub min_height: usize,

    /// Maximum dsv of a leaf, in radians. Default: 3 degrees.
    pub std_dsv_threshold: f32,

    /// Evaluate pending windows with rayon. Default: true.
    pub parallel: bool,
}

impl Default for NormalSplitter {
    fn default() -> Self {
        Self {
            min_width: 2,
            min_height: 2,
            std_dsv_threshold: 3.0_f32.to_radians(),
            parallel: true,
        }
    }
}

impl NormalSplitter {
    /// Set the minimum region size.
    #[must_use]
    pub const fn with_min_region_size(mut self, width: usize, height: usize) -> Self {
        self.min_width = width;
        self.min_height = height;
        self
    }

    /// Set the dsv threshold in radians.
    #[must_use]
    pub const fn with_std_dsv_threshold(mut self, threshold: f32) -> Self {
        self.std_dsv_threshold = threshold;
        self
    }

    /// Enable or disable parallel evaluation.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] if a minimum size is zero or the
    /// threshold is not a finite value above [`EPSILON`].
    pub fn validate(&self) -> SegResult<()> {
        if self.min_width == 0 || self.min_height == 0 {
            return Err(SegError::configuration(format!(
                "minimum region size must be at least 1x1, got {}x{}",
                self.min_width, self.min_height
            )));
        }
        if !self.std_dsv_threshold.is_finite() || self.std_dsv_threshold <= EPSILON {
            return Err(SegError::configuration(format!(
                "split dsv threshold must be positive, got {}",
                self.std_dsv_threshold
            )));
        }
        Ok(())
    }

    /// Axis to halve `rect` along, or `None` if neither half would fit.
    #[must_use]
    pub const fn split_axis(&self, rect: &GridRect) -> Option<SplitAxis> {
        let cols = rect.width >= 2 * self.min_width;
        let rows = rect.height >= 2 * self.min_height;
        let prefer_cols = rect.width > rect.height;
        match (prefer_cols, cols, rows) {
            (true, true, _) | (false, true, false) => Some(SplitAxis::Columns),
            (false, _, true) | (true, false, true) => Some(SplitAxis::Rows),
            _ => None,
        }
    }

    /// Decide the fate of `rect` from its moments and deviation sum.
    ///
    /// Shared by the host and device paths so that both apply the same rule.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn decide(
        &self,
        rect: GridRect,
        moments: &RegionMoments,
        deviation_sum: f64,
    ) -> SplitDecision {
        if moments.count == 0 {
            return SplitDecision::Discard;
        }
        let dsv = (deviation_sum / moments.count as f64) as f32;
        if dsv > self.std_dsv_threshold {
            if let Some(axis) = self.split_axis(&rect) {
                let (a, b) = halve(rect, axis);
                return SplitDecision::Split(a, b);
            }
        }
        // A leaf needs a unit mean normal.
        let Some(normal) = moments.mean_normal() else {
            return SplitDecision::Discard;
        };
        SplitDecision::Leaf(NormalRegion {
            rect,
            normal,
            std_dev: moments.std_dev(),
            dsv,
            valid_count: moments.count,
        })
    }

    /// Evaluate one window of a host normal cloud.
    #[must_use]
    pub fn evaluate(&self, normals: &Cloud, rect: GridRect) -> SplitDecision {
        let moments = window_moments(normals, rect);
        let deviation_sum = match moments.mean_normal() {
            Some(mean) => window_deviation_sum(normals, rect, &mean),
            // Normals cancel out: every one is a quarter turn from the null mean.
            #[allow(clippy::cast_precision_loss)]
            None => moments.count as f64 * std::f64::consts::FRAC_PI_2,
        };
        self.decide(rect, &moments, deviation_sum)
    }

    /// Split a host normal cloud into homogeneous regions.
    ///
    /// `out` is replaced with the leaves, sorted by `(y, x)`, and only
    /// written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration and
    /// [`SegError::DataShape`] for an empty, mis-sized or unorganized cloud.
    pub fn split(&self, normals: &Cloud, out: &mut Vec<NormalRegion>) -> SegResult<()> {
        self.validate()?;
        normals.validate_organized()?;

        let mut leaves = Vec::new();
        let mut pending = vec![GridRect::new(0, 0, normals.width, normals.height)];
        let mut levels = 0usize;

        while !pending.is_empty() {
            let decisions: Vec<SplitDecision> = if self.parallel {
                pending
                    .par_iter()
                    .map(|rect| self.evaluate(normals, *rect))
                    .collect()
            } else {
                pending
                    .iter()
                    .map(|rect| self.evaluate(normals, *rect))
                    .collect()
            };
            pending = self.apply_decisions(decisions, &mut leaves);
            levels += 1;
        }

        sort_regions(&mut leaves);
        debug!(regions = leaves.len(), levels, "Normal cloud split");
        *out = leaves;
        Ok(())
    }

    /// Route decisions to the leaf list and return the next pending windows.
    ///
    /// Exposed for execution backends that evaluate windows themselves.
    #[must_use]
    pub fn apply_decisions(
        &self,
        decisions: Vec<SplitDecision>,
        leaves: &mut Vec<NormalRegion>,
    ) -> Vec<GridRect> {
        let mut next = Vec::new();
        for decision in decisions {
            match decision {
                SplitDecision::Discard => {}
                SplitDecision::Leaf(region) => leaves.push(region),
                SplitDecision::Split(a, b) => {
                    next.push(a);
                    next.push(b);
                }
            }
        }
        next
    }
}

/// Halve `rect` along `axis`; the second half takes the odd cell.
#[must_use]
pub const fn halve(rect: GridRect, axis: SplitAxis) -> (GridRect, GridRect) {
    match axis {
        SplitAxis::Columns => {
            let w = rect.width / 2;
            (
                GridRect::new(rect.x, rect.y, w, rect.height),
                GridRect::new(rect.x + w, rect.y, rect.width - w, rect.height),
            )
        }
        SplitAxis::Rows => {
            let h = rect.height / 2;
            (
                GridRect::new(rect.x, rect.y, rect.width, h),
                GridRect::new(rect.x, rect.y + h, rect.width, rect.height - h),
            )
        }
    }
}

/// Canonical region order: by row, then column.
pub fn sort_regions(regions: &mut [NormalRegion]) {
    regions.sort_by_key(|r| (r.rect.y, r.rect.x));
}
