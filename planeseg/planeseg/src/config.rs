//! Pipeline configuration and presets.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use planeseg_merge::NormalMerger;
use planeseg_normals::NormalExtractor;
use planeseg_split::NormalSplitter;
use planeseg_types::{SegError, SegResult};

use crate::organizer::Organizer;

/// Parameters of the final plane fit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneFitParams {
    /// Groups with fewer finite points are dropped. Default: 3.
    pub min_support_points: usize,

    /// Fit groups in parallel with rayon. Default: true.
    pub parallel: bool,
}

impl Default for PlaneFitParams {
    fn default() -> Self {
        Self {
            min_support_points: 3,
            parallel: true,
        }
    }
}

impl PlaneFitParams {
    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] if fewer than three support points
    /// are allowed, since no plane is defined by fewer.
    pub fn validate(&self) -> SegResult<()> {
        if self.min_support_points < 3 {
            return Err(SegError::configuration(format!(
                "a plane needs at least 3 support points, got {}",
                self.min_support_points
            )));
        }
        Ok(())
    }
}

/// All tunables of the segmentation pipeline.
///
/// # Example
///
/// ```
/// use planeseg::SegmentationConfig;
///
/// let config = SegmentationConfig::fine()
///     .with_search_radius(0.2)
///     .with_merge_thresholds(4.0_f32.to_radians(), 20.0_f32.to_radians());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentationConfig {
    /// Gridding of unorganized input.
    pub organizer: Organizer,

    /// Normal estimation.
    pub normals: NormalExtractor,

    /// Region splitting.
    pub split: NormalSplitter,

    /// Region merging.
    pub merge: NormalMerger,

    /// Plane fitting.
    pub fit: PlaneFitParams,

    /// Keep the organized cloud, normal cloud and region lists of the last
    /// call in the context. Default: false.
    pub store_intermediate_results: bool,
}

impl SegmentationConfig {
    /// Settings for dense clouds with small planar features.
    ///
    /// Smaller search radius and tighter angular thresholds.
    #[must_use]
    pub fn fine() -> Self {
        Self {
            normals: NormalExtractor::default().with_search_radius(0.25),
            split: NormalSplitter::default().with_std_dsv_threshold(2.0_f32.to_radians()),
            merge: NormalMerger::default()
                .with_std_dsv_thresholds(3.0_f32.to_radians(), 15.0_f32.to_radians()),
            ..Default::default()
        }
    }

    /// Settings for noisy clouds dominated by large planes.
    ///
    /// Larger search radius, 4x4 minimum regions and looser thresholds.
    #[must_use]
    pub fn coarse() -> Self {
        Self {
            normals: NormalExtractor::default().with_search_radius(1.0),
            split: NormalSplitter::default()
                .with_min_region_size(4, 4)
                .with_std_dsv_threshold(5.0_f32.to_radians()),
            merge: NormalMerger::default()
                .with_std_dsv_thresholds(8.0_f32.to_radians(), 35.0_f32.to_radians()),
            ..Default::default()
        }
    }

    /// Set the normal search radius, in cloud units.
    #[must_use]
    pub const fn with_search_radius(mut self, radius: f32) -> Self {
        self.normals.search_radius = radius;
        self
    }

    /// Enable or disable normal orientation toward the view point.
    #[must_use]
    pub const fn with_flip_normals(mut self, flip: bool) -> Self {
        self.normals.flip_normals = flip;
        self
    }

    /// Orient normals toward `view_point` instead of the sensor origin.
    #[must_use]
    pub const fn with_flip_view_point(mut self, view_point: Point3<f32>) -> Self {
        self.normals.flip_view_point = Some(view_point);
        self
    }

    /// Set the largest grid the organizer may build.
    #[must_use]
    pub const fn with_organizer_max_size(mut self, width: usize, height: usize) -> Self {
        self.organizer.max_width = width;
        self.organizer.max_height = height;
        self
    }

    /// Set the minimum split region size, in cells.
    #[must_use]
    pub const fn with_min_region_size(mut self, width: usize, height: usize) -> Self {
        self.split.min_width = width;
        self.split.min_height = height;
        self
    }

    /// Set the split dsv threshold, in radians.
    #[must_use]
    pub const fn with_split_threshold(mut self, threshold: f32) -> Self {
        self.split.std_dsv_threshold = threshold;
        self
    }

    /// Set the merge thresholds, in radians.
    #[must_use]
    pub const fn with_merge_thresholds(mut self, min: f32, max: f32) -> Self {
        self.merge.min_std_dsv_threshold = min;
        self.merge.max_std_dsv_threshold = max;
        self
    }

    /// Set the minimum number of finite points behind a plane.
    #[must_use]
    pub const fn with_min_support_points(mut self, points: usize) -> Self {
        self.fit.min_support_points = points;
        self
    }

    /// Keep intermediate results in the context.
    #[must_use]
    pub const fn with_store_intermediate_results(mut self, store: bool) -> Self {
        self.store_intermediate_results = store;
        self
    }

    /// Enable or disable rayon in every host stage.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.normals.parallel = parallel;
        self.split.parallel = parallel;
        self.fit.parallel = parallel;
        self
    }

    /// Check every stage's configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`SegError::Configuration`] found, in pipeline order.
    pub fn validate(&self) -> SegResult<()> {
        self.organizer.validate()?;
        self.normals.validate()?;
        self.split.validate()?;
        self.merge.validate()?;
        self.fit.validate()
    }
}
