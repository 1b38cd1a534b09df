//! Core data types for organized point-cloud plane segmentation.
//!
//! This crate provides the types shared by every pipeline stage:
//!
//! - [`Point`] - A grid cell: position in point clouds, normal in normal clouds
//! - [`Cloud`] - A row-major organized grid of points with a sensor origin
//! - [`GridRect`] - A rectangular window of grid cells
//! - [`NormalRegion`] - A window plus statistics over its normals
//! - [`Plane`] - A fitted plane with its supporting regions
//! - [`SegError`] - The error taxonomy of the pipeline
//!
//! # Invalid Cells
//!
//! Sensor dropouts are stored as `NaN` points. They occupy their grid slot
//! (so grid adjacency still approximates spatial adjacency) but never take
//! part in any statistic.
//!
//! # Example
//!
//! ```
//! use planeseg_types::{Cloud, Point};
//!
//! let mut cloud = Cloud::from_fn(8, 8, |col, row| {
//!     Point::new(col as f32 * 0.1, row as f32 * 0.1, 1.0)
//! });
//! cloud.points[0] = Point::invalid();
//!
//! assert!(cloud.validate_organized().is_ok());
//! assert_eq!(cloud.finite_count(), 63);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod cloud;
mod error;
mod plane;
mod point;
mod region;

pub use cloud::Cloud;
pub use error::{SegError, SegResult};
pub use plane::Plane;
pub use point::{EPSILON, Point};
pub use region::{GridRect, NormalRegion};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn test_cloud_json_roundtrip() {
        let cloud = Cloud::from_fn(2, 2, |c, r| Point::new(c as f32, r as f32, 1.0));
        let json = serde_json::to_string(&cloud).ok();
        assert!(json.is_some());
        let back: Option<Cloud> = json.and_then(|j| serde_json::from_str(&j).ok());
        assert_eq!(back, Some(cloud));
    }
}
