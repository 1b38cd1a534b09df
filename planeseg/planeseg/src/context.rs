//! Per-pipeline state: configuration, device resources and diagnostics.

use planeseg_merge::MergedRegion;
use planeseg_types::{Cloud, NormalRegion};

#[cfg(feature = "gpu")]
use planeseg_gpu::DeviceResources;

use crate::config::SegmentationConfig;

/// Wall-clock time spent in each stage of the last call, in microseconds.
///
/// Stages that did not run in that call stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// Gridding of unorganized input.
    pub organization_us: u64,
    /// Normal estimation.
    pub normal_extraction_us: u64,
    /// Region splitting.
    pub normal_split_us: u64,
    /// Region merging.
    pub normal_merge_us: u64,
    /// Plane fitting.
    pub plane_fit_us: u64,
}

impl StageTimings {
    /// Sum over all stages.
    #[must_use]
    pub const fn total_us(&self) -> u64 {
        self.organization_us
            + self.normal_extraction_us
            + self.normal_split_us
            + self.normal_merge_us
            + self.plane_fit_us
    }
}

#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    pub timings: StageTimings,
    pub organization: Option<Cloud>,
    pub normals: Option<Cloud>,
    pub split: Option<Vec<NormalRegion>>,
    pub merge: Option<Vec<MergedRegion>>,
}

/// State threaded through a segmentation call.
///
/// Holds the configuration, the optional GPU resources used by the device
/// path, and diagnostics of the last call. The context never owns input or
/// output data; intermediate results are only kept when
/// [`SegmentationConfig::store_intermediate_results`] is set.
///
/// # Example
///
/// ```
/// use planeseg::{Context, SegmentationConfig};
///
/// let ctx = Context::new(SegmentationConfig::default().with_store_intermediate_results(true));
/// assert!(ctx.last_normal_split_result().is_none());
/// assert_eq!(ctx.timings().total_us(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Context {
    config: SegmentationConfig,
    #[cfg(feature = "gpu")]
    device: Option<DeviceResources>,
    pub(crate) diagnostics: Diagnostics,
}

impl Context {
    /// Create a host-only context.
    #[must_use]
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "gpu")]
            device: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Attach GPU resources for the device path.
    #[cfg(feature = "gpu")]
    #[must_use]
    pub fn with_device(mut self, resources: DeviceResources) -> Self {
        self.device = Some(resources);
        self
    }

    /// Replace or remove the GPU resources.
    #[cfg(feature = "gpu")]
    pub fn set_device_resources(&mut self, resources: Option<DeviceResources>) {
        self.device = resources;
    }

    /// The attached GPU resources, if any.
    #[cfg(feature = "gpu")]
    #[must_use]
    pub const fn device(&self) -> Option<&DeviceResources> {
        self.device.as_ref()
    }

    /// The pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Mutable access to the configuration between calls.
    pub fn config_mut(&mut self) -> &mut SegmentationConfig {
        &mut self.config
    }

    /// Stage timings of the last call.
    #[must_use]
    pub const fn timings(&self) -> &StageTimings {
        &self.diagnostics.timings
    }

    /// The organized cloud of the last call.
    ///
    /// `None` unless intermediate results are stored and the call reached
    /// that stage.
    #[must_use]
    pub fn last_organization_result(&self) -> Option<&Cloud> {
        self.diagnostics.organization.as_ref()
    }

    /// The normal cloud of the last call.
    #[must_use]
    pub fn last_normal_extraction_result(&self) -> Option<&Cloud> {
        self.diagnostics.normals.as_ref()
    }

    /// The regions produced by the splitter in the last call.
    #[must_use]
    pub fn last_normal_split_result(&self) -> Option<&[NormalRegion]> {
        self.diagnostics.split.as_deref()
    }

    /// The groups produced by the merger in the last call.
    #[must_use]
    pub fn last_normal_merge_result(&self) -> Option<&[MergedRegion]> {
        self.diagnostics.merge.as_deref()
    }

    pub(crate) const fn stores_intermediate(&self) -> bool {
        self.config.store_intermediate_results
    }

    pub(crate) fn reset_diagnostics(&mut self) {
        self.diagnostics = Diagnostics::default();
    }
}
