//! Surface normal estimation for organized point clouds.
//!
//! For every valid cell of an organized [`Cloud`](planeseg_types::Cloud) the
//! [`NormalExtractor`] gathers the finite points of a circular grid window,
//! fits a local plane through their covariance, and reports the eigenvector
//! of the smallest eigenvalue as the normal. Normals can be oriented toward
//! the sensor origin or an explicit view point.
//!
//! The window radius is derived from the search radius and the cloud's cell
//! spacing ([`grid::cell_distance`]). Only grid neighbours are tested, which
//! keeps the cost per point bounded regardless of cloud size.
//!
//! # Degenerate Neighbourhoods
//!
//! Fewer than three finite neighbours, coincident points and line-like
//! neighbourhoods yield an invalid normal (zero vector, `aux = 0`). These are
//! excluded from every later statistic; they are never reported as errors.
//!
//! # Example
//!
//! ```
//! use planeseg_normals::NormalExtractor;
//! use planeseg_types::{Cloud, Point};
//!
//! let cloud = Cloud::from_fn(32, 24, |c, r| Point::new(c as f32 * 0.02, r as f32 * 0.02, 1.5));
//! let mut normals = Cloud::new();
//! NormalExtractor::default()
//!     .with_search_radius(0.05)
//!     .estimate_normals(&cloud, &mut normals)
//!     .unwrap();
//!
//! assert_eq!(normals.valid_normal_count(), 32 * 24);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod eigen;
mod extractor;
pub mod grid;

pub use extractor::NormalExtractor;
