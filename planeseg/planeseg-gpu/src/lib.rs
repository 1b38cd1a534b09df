//! GPU execution of the normal-estimation and splitting stages.
//!
//! This crate runs the two data-parallel stages of the segmentation pipeline
//! as WGPU compute shaders:
//!
//! - [`estimate_normals_gpu`] - one invocation per cell, same closed-form
//!   eigen solver as the host extractor
//! - [`split_gpu`] - one workgroup per pending window, with the split rule
//!   itself applied on the host through
//!   [`NormalSplitter::decide`](planeseg_split::NormalSplitter::decide)
//!
//! Both produce the same results as their host counterparts, to within
//! `f32` rounding of the accumulated sums.
//!
//! # GPU Availability
//!
//! The device is detected at runtime. [`DeviceResources::acquire`] fails
//! with [`GpuError::NotAvailable`] on machines without a usable adapter, and
//! every [`GpuError`] converts into
//! [`SegError::Device`](planeseg_types::SegError::Device) so callers can fall
//! back to the host path.
//!
//! # Example
//!
//! ```no_run
//! use planeseg_gpu::{DeviceCloud, DeviceResources, estimate_normals_gpu, split_gpu};
//! use planeseg_normals::NormalExtractor;
//! use planeseg_split::NormalSplitter;
//! use planeseg_types::{Cloud, Point};
//!
//! let resources = DeviceResources::acquire().unwrap();
//! let cloud = Cloud::from_fn(64, 48, |c, r| Point::new(c as f32 * 0.01, r as f32 * 0.01, 2.0));
//!
//! let input = DeviceCloud::upload(&cloud, &resources).unwrap();
//! let mut normals = DeviceCloud::allocate_like(&input, &resources).unwrap();
//! estimate_normals_gpu(&NormalExtractor::default(), &input, &mut normals, &resources).unwrap();
//!
//! let mut regions = Vec::new();
//! split_gpu(&NormalSplitter::default(), &normals, &mut regions, &resources).unwrap();
//! assert_eq!(regions.len(), 1);
//! ```
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench -p planeseg-gpu
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod buffers;
pub mod context;
mod device_cloud;
pub mod error;
mod normals;
mod resources;
mod split;

pub use context::{ComputeLimits, GpuAdapterInfo, GpuContext};
pub use device_cloud::DeviceCloud;
pub use error::{GpuError, GpuResult};
pub use normals::estimate_normals_gpu;
pub use resources::DeviceResources;
pub use split::split_gpu;
