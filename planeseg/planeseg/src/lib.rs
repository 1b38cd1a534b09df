//! Plane segmentation of organized point clouds.
//!
//! This umbrella crate wires the `planeseg-*` stages into one pipeline and
//! re-exports them. A call runs:
//!
//! 1. **Organize**: grid unorganized input ([`Organizer`]).
//! 2. **Extract**: per-point normals by local PCA ([`normals`]).
//! 3. **Split**: halve the grid until windows are homogeneous ([`split`]).
//! 4. **Merge**: join adjacent windows with close normals ([`merge`]).
//! 5. **Fit**: least-squares plane per merged group.
//!
//! Steps 2 and 3 also run on the GPU with the `gpu` feature, giving the same
//! planes within floating-point tolerance.
//!
//! # Quick Start
//!
//! ```
//! use planeseg::prelude::*;
//!
//! // A floor at z = 0.5 seen from above.
//! let cloud = Cloud::from_fn(32, 24, |c, r| {
//!     Point::new(c as f32 * 0.05, r as f32 * 0.05, 0.5)
//! })
//! .with_sensor_origin(Point3::new(0.8, 0.6, 2.0));
//!
//! let mut ctx = Context::new(SegmentationConfig::default());
//! let mut planes = Vec::new();
//! PlaneSegmentator::segmentate(&cloud, &mut planes, &mut ctx).unwrap();
//!
//! assert_eq!(planes.len(), 1);
//! assert!(planes[0].normal.z > 0.999);
//! println!("{} us", ctx.timings().total_us());
//! ```
//!
//! # GPU
//!
//! ```no_run
//! # #[cfg(feature = "gpu")]
//! # {
//! use planeseg::prelude::*;
//! use planeseg::gpu::{DeviceCloud, DeviceResources};
//!
//! let cloud = Cloud::from_fn(640, 480, |c, r| Point::new(c as f32, r as f32, 1.0));
//! let resources = DeviceResources::acquire().unwrap();
//! let device = DeviceCloud::upload(&cloud, &resources).unwrap();
//!
//! let mut ctx = Context::new(SegmentationConfig::default()).with_device(resources);
//! let mut planes = Vec::new();
//! if let Err(e) = PlaneSegmentator::segmentate_device(&device, &mut planes, &mut ctx) {
//!     assert!(e.is_device());
//!     PlaneSegmentator::segmentate(&cloud, &mut planes, &mut ctx).unwrap();
//! }
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `gpu` - Device path via WGPU compute shaders
//! - `serde` - Serialize configurations and results

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod config;
mod context;
mod fit;
mod organizer;
mod segmentator;

pub use config::{PlaneFitParams, SegmentationConfig};
pub use context::{Context, StageTimings};
pub use organizer::Organizer;
pub use segmentator::PlaneSegmentator;

// =============================================================================
// Re-exports
// =============================================================================

/// Points, clouds, regions, planes and errors.
pub use planeseg_types as types;

/// Normal estimation.
pub use planeseg_normals as normals;

/// Region splitting.
pub use planeseg_split as split;

/// Region merging.
pub use planeseg_merge as merge;

/// GPU context, device clouds and device stages (requires `gpu` feature).
#[cfg(feature = "gpu")]
pub use planeseg_gpu as gpu;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for plane segmentation.
pub mod prelude {
    pub use crate::{Context, Organizer, PlaneFitParams, PlaneSegmentator, SegmentationConfig, StageTimings};
    pub use planeseg_merge::{MergedRegion, NormalMerger};
    pub use planeseg_normals::NormalExtractor;
    pub use planeseg_split::NormalSplitter;
    pub use planeseg_types::{Cloud, GridRect, NormalRegion, Plane, Point, Point3, SegError, SegResult, Vector3};
}
