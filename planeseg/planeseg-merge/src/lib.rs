//! Merging of adjacent normal regions into planar patches.
//!
//! The splitter leaves large planes cut into many rectangles. The
//! [`NormalMerger`] joins edge-adjacent regions whose mean normals are close,
//! always taking the most compatible pair first, until no compatible pair is
//! left. Each surviving [`MergedRegion`] is a candidate plane.
//!
//! # Determinism
//!
//! Candidate pairs are ranked by angle, then by group indices, so the final
//! partition does not depend on hash-set iteration order or on the order
//! pairs were discovered in.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod adjacency;
mod merger;

pub use adjacency::region_neighbors;
pub use merger::{MergedRegion, NormalMerger};
