//! Hierarchical splitting of normal clouds into homogeneous regions.
//!
//! [`NormalSplitter`] starts from the full grid and halves windows whose
//! normals disagree too much, until every window is homogeneous or would
//! fall below the minimum region size. The work list is explicit and
//! processed one level at a time, so there is no recursion and every level
//! is a batch of independent windows that can run on rayon or the GPU.
//!
//! # Statistics
//!
//! For each window the valid normals give:
//!
//! - the unit mean normal,
//! - the per-axis standard deviation of the normal components,
//! - the dsv: mean `acos(n · mean)`, in radians.
//!
//! The dsv drives the split decision; the rest is carried on the emitted
//! [`NormalRegion`](planeseg_types::NormalRegion).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod splitter;
pub mod stats;

pub use splitter::{NormalSplitter, SplitAxis, SplitDecision, halve, sort_regions};
pub use stats::RegionMoments;
