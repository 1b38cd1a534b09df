//! Priority-driven merging of adjacent regions.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use hashbrown::HashSet;
use nalgebra::Vector3;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use planeseg_types::{EPSILON, GridRect, NormalRegion, SegError, SegResult};

use crate::adjacency::region_neighbors;

/// A connected group of regions with compatible normals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergedRegion {
    /// Member regions, in input order.
    pub regions: Vec<NormalRegion>,
    /// Unit mean normal, weighted by valid-normal count.
    pub normal: Vector3<f32>,
    /// Per-component standard deviation of the members' normals, pooled
    /// from their moments as if taken over the union of their cells.
    pub std_dev: Vector3<f32>,
    /// Pooled angular dispersion, in radians.
    pub dsv: f32,
    /// Total valid normals over all members.
    pub valid_count: usize,
    /// Bounding window of the members.
    pub bounds: GridRect,
}

impl MergedRegion {
    /// Number of grid cells covered by the members.
    #[must_use]
    pub fn area(&self) -> usize {
        self.regions.iter().map(NormalRegion::area).sum()
    }
}

/// Merges adjacent regions whose mean normals differ by a small angle.
///
/// Candidate pairs are processed globally by increasing angle between their
/// mean normals. Angles under `min_std_dsv_threshold` all rank equal, and
/// ties go to the lowest pair of group indices. Pairs at or above
/// `max_std_dsv_threshold` are never merged. After each merge the surviving
/// group's statistics are recomputed and its candidate pairs re-ranked, until
/// no candidate is left.
///
/// The merge sequence for a larger maximum threshold extends the sequence
/// for a smaller one, so raising it never increases the group count.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use planeseg_merge::NormalMerger;
/// use planeseg_types::{GridRect, NormalRegion};
///
/// let make = |x, normal| NormalRegion {
///     rect: GridRect::new(x, 0, 4, 4),
///     normal,
///     std_dev: Vector3::zeros(),
///     dsv: 0.0,
///     valid_count: 16,
/// };
/// let tilted = Vector3::new(0.0, 0.02, 1.0).normalize();
/// let regions = [make(0, Vector3::z()), make(4, tilted), make(8, Vector3::x())];
///
/// let mut merged = Vec::new();
/// NormalMerger::default().merge(&regions, &mut merged).unwrap();
///
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].regions.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalMerger {
    /// Angle below which pairs rank as equally compatible, in radians.
    /// Default: 5 degrees.
    pub min_std_dsv_threshold: f32,

    /// Angle at or above which pairs are never merged, in radians.
    /// Default: 25 degrees.
    pub max_std_dsv_threshold: f32,
}

impl Default for NormalMerger {
    fn default() -> Self {
        Self {
            min_std_dsv_threshold: 5.0_f32.to_radians(),
            max_std_dsv_threshold: 25.0_f32.to_radians(),
        }
    }
}

/// A ranked candidate pair; `a < b`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: f32,
    a: usize,
    b: usize,
    versions: (u32, u32),
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then(self.a.cmp(&other.a))
            .then(self.b.cmp(&other.b))
            .then(self.versions.cmp(&other.versions))
    }
}

#[derive(Debug)]
struct Group {
    members: Vec<usize>,
    weighted_sum: Vector3<f64>,
    spread: Spread,
    normal: Vector3<f64>,
    valid_count: usize,
    bounds: GridRect,
    neighbors: HashSet<usize>,
    version: u32,
    alive: bool,
}

impl NormalMerger {
    /// Set both thresholds, in radians.
    #[must_use]
    pub const fn with_std_dsv_thresholds(mut self, min: f32, max: f32) -> Self {
        self.min_std_dsv_threshold = min;
        self.max_std_dsv_threshold = max;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] unless
    /// `EPSILON < min < max` with both finite.
    pub fn validate(&self) -> SegResult<()> {
        let (min, max) = (self.min_std_dsv_threshold, self.max_std_dsv_threshold);
        if !min.is_finite() || min <= EPSILON {
            return Err(SegError::configuration(format!(
                "minimum merge threshold must be positive, got {min}"
            )));
        }
        if !max.is_finite() || max <= min {
            return Err(SegError::configuration(format!(
                "maximum merge threshold must exceed the minimum ({min}), got {max}"
            )));
        }
        Ok(())
    }

    /// Merge `regions` into groups of compatible neighbours.
    ///
    /// `out` is replaced with the groups, ordered by their first member, and
    /// only written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration.
    pub fn merge(&self, regions: &[NormalRegion], out: &mut Vec<MergedRegion>) -> SegResult<()> {
        self.validate()?;

        let mut groups = init_groups(regions);
        let mut heap = BinaryHeap::new();
        for a in 0..groups.len() {
            for &b in &groups[a].neighbors {
                if a < b {
                    self.push_candidate(&mut heap, &groups, a, b);
                }
            }
        }

        let mut merges = 0usize;
        while let Some(Reverse(candidate)) = heap.pop() {
            let Candidate { a, b, versions, .. } = candidate;
            if !groups[a].alive
                || !groups[b].alive
                || versions != (groups[a].version, groups[b].version)
            {
                continue;
            }
            absorb(&mut groups, a, b);
            merges += 1;
            let neighbors: Vec<usize> = groups[a].neighbors.iter().copied().collect();
            for n in neighbors {
                let (x, y) = if a < n { (a, n) } else { (n, a) };
                self.push_candidate(&mut heap, &groups, x, y);
            }
        }

        let merged: Vec<MergedRegion> = groups
            .iter()
            .filter(|g| g.alive)
            .map(|g| build_region(g, regions))
            .collect();
        debug!(
            regions = regions.len(),
            groups = merged.len(),
            merges,
            "Normal regions merged"
        );
        *out = merged;
        Ok(())
    }

    fn push_candidate(
        &self,
        heap: &mut BinaryHeap<Reverse<Candidate>>,
        groups: &[Group],
        a: usize,
        b: usize,
    ) {
        let angle = angle_between(&groups[a].normal, &groups[b].normal);
        if angle >= f64::from(self.max_std_dsv_threshold) {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let key = if angle < f64::from(self.min_std_dsv_threshold) {
            0.0
        } else {
            angle as f32
        };
        heap.push(Reverse(Candidate {
            key,
            a,
            b,
            versions: (groups[a].version, groups[b].version),
        }));
    }
}

fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

#[allow(clippy::cast_precision_loss)]
fn init_groups(regions: &[NormalRegion]) -> Vec<Group> {
    region_neighbors(regions)
        .into_iter()
        .zip(regions)
        .enumerate()
        .map(|(index, (neighbors, region))| {
            let normal = region.normal.cast::<f64>();
            Group {
                members: vec![index],
                weighted_sum: normal * region.valid_count as f64,
                spread: Spread::of(region),
                normal,
                valid_count: region.valid_count,
                bounds: region.rect,
                neighbors,
                version: 0,
                alive: true,
            }
        })
        .collect()
}

/// Unnormalized mean and per-component squared deviation sum of a set of
/// normals, combined pairwise so small variances survive large means.
#[derive(Debug, Clone, Copy)]
struct Spread {
    mean: Vector3<f64>,
    m2: Vector3<f64>,
}

impl Spread {
    /// Unit normals have `|mean|² + Σ std² = 1`, which recovers the length
    /// of the mean the region's deviations are taken around.
    #[allow(clippy::cast_precision_loss)]
    fn of(region: &NormalRegion) -> Self {
        let std = region.std_dev.cast::<f64>();
        let len = (1.0 - std.norm_squared()).max(0.0).sqrt();
        Self {
            mean: region.normal.cast::<f64>() * len,
            m2: std.component_mul(&std) * region.valid_count as f64,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn combine(&mut self, count: usize, other: &Self, other_count: usize) {
        if count + other_count == 0 {
            return;
        }
        let total = (count + other_count) as f64;
        let (na, nb) = (count as f64, other_count as f64);
        let delta = other.mean - self.mean;
        self.mean += delta * (nb / total);
        self.m2 += other.m2 + delta.component_mul(&delta) * (na * nb / total);
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn std_dev(&self, count: usize) -> Vector3<f32> {
        if count == 0 {
            return Vector3::zeros();
        }
        (self.m2 / count as f64).map(|v| v.max(0.0).sqrt() as f32)
    }
}

/// Fold group `b` into group `a` and rewire the neighbour sets.
fn absorb(groups: &mut [Group], a: usize, b: usize) {
    let taken = std::mem::take(&mut groups[b].members);
    let b_neighbors = std::mem::take(&mut groups[b].neighbors);
    let (b_sum, b_spread, b_count, b_bounds) = (
        groups[b].weighted_sum,
        groups[b].spread,
        groups[b].valid_count,
        groups[b].bounds,
    );
    groups[b].alive = false;

    for &n in &b_neighbors {
        if n != a {
            groups[n].neighbors.remove(&b);
            groups[n].neighbors.insert(a);
        }
    }

    let group = &mut groups[a];
    group.members.extend(taken);
    group.neighbors.remove(&b);
    group.neighbors.extend(b_neighbors.into_iter().filter(|&n| n != a));
    group.weighted_sum += b_sum;
    group.spread.combine(group.valid_count, &b_spread, b_count);
    group.valid_count += b_count;
    group.bounds = group.bounds.union(&b_bounds);
    let len = group.weighted_sum.norm();
    if len > 1e-12 {
        group.normal = group.weighted_sum / len;
    }
    group.version += 1;
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn build_region(group: &Group, regions: &[NormalRegion]) -> MergedRegion {
    let mut members = group.members.clone();
    members.sort_unstable();
    let members: Vec<NormalRegion> = members.into_iter().map(|i| regions[i]).collect();

    let dsv = if group.valid_count == 0 {
        0.0
    } else {
        let pooled: f64 = members
            .iter()
            .map(|r| {
                let spread = f64::from(r.dsv) + angle_between(&r.normal.cast(), &group.normal);
                spread * r.valid_count as f64
            })
            .sum();
        pooled / group.valid_count as f64
    };

    MergedRegion {
        regions: members,
        normal: group.normal.cast::<f32>(),
        std_dev: group.spread.std_dev(group.valid_count),
        dsv: dsv as f32,
        valid_count: group.valid_count,
        bounds: group.bounds,
    }
}
