//! Pipeline orchestration.

use std::borrow::Cow;
use std::time::Instant;

use tracing::{debug, info};

use planeseg_merge::MergedRegion;
use planeseg_types::{Cloud, NormalRegion, Plane, SegError, SegResult};

#[cfg(feature = "gpu")]
use planeseg_gpu::{DeviceCloud, DeviceResources, estimate_normals_gpu, split_gpu};

use crate::context::Context;
use crate::fit;

fn micros_since(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(feature = "gpu")]
fn device_resources(ctx: &Context) -> SegResult<&DeviceResources> {
    ctx.device()
        .ok_or_else(|| SegError::configuration("device path requires GPU resources in the context"))
}

/// Runs the segmentation pipeline.
///
/// A call organizes the input if needed, estimates normals, splits the
/// normal field into homogeneous windows, merges compatible neighbours and
/// fits one plane per merged group. Each stage is also callable on its own
/// with the same [`Context`].
///
/// Outputs are replaced only when a call succeeds; on error they are left as
/// they were.
///
/// # Example
///
/// ```
/// use planeseg::{Context, PlaneSegmentator, SegmentationConfig};
/// use planeseg_types::{Cloud, Point};
///
/// // A floor at z = 1.
/// let cloud = Cloud::from_fn(16, 16, |c, r| Point::new(c as f32 * 0.1, r as f32 * 0.1, 1.0));
///
/// let mut ctx = Context::new(SegmentationConfig::default());
/// let mut planes = Vec::new();
/// PlaneSegmentator::segmentate(&cloud, &mut planes, &mut ctx).unwrap();
///
/// assert_eq!(planes.len(), 1);
/// assert!((planes[0].normal.z.abs() - 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneSegmentator;

impl PlaneSegmentator {
    /// Segment `input` on the host.
    ///
    /// Unorganized input is gridded first with the configured organizer.
    /// Diagnostics of the previous call are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration and
    /// [`SegError::DataShape`] for an empty or mis-sized cloud.
    pub fn segmentate(input: &Cloud, out: &mut Vec<Plane>, ctx: &mut Context) -> SegResult<()> {
        ctx.reset_diagnostics();
        ctx.config().validate()?;
        input.validate_shape()?;

        let cloud = if input.is_organized() {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(Self::organize(input, ctx)?)
        };

        let mut normals = Cloud::new();
        Self::extract_normals(&cloud, &mut normals, ctx)?;
        let mut regions = Vec::new();
        Self::split(&normals, &mut regions, ctx)?;
        let mut groups = Vec::new();
        Self::merge(&regions, &mut groups, ctx)?;
        let mut planes = Vec::new();
        Self::fit_planes(&cloud, &groups, &mut planes, ctx)?;

        info!(
            width = cloud.width,
            height = cloud.height,
            regions = regions.len(),
            planes = planes.len(),
            total_us = ctx.timings().total_us(),
            "Segmentation complete"
        );
        *out = planes;
        Ok(())
    }

    fn organize(input: &Cloud, ctx: &mut Context) -> SegResult<Cloud> {
        let start = Instant::now();
        let mut organized = Cloud::new();
        ctx.config().organizer.organize(input, &mut organized)?;
        ctx.diagnostics.timings.organization_us = micros_since(start);

        if ctx.stores_intermediate() {
            ctx.diagnostics.organization = Some(organized.clone());
        }
        Ok(organized)
    }

    /// Estimate normals of an organized cloud on the host.
    ///
    /// # Errors
    ///
    /// Propagates the errors of
    /// [`NormalExtractor::estimate_normals`](planeseg_normals::NormalExtractor::estimate_normals).
    pub fn extract_normals(input: &Cloud, output: &mut Cloud, ctx: &mut Context) -> SegResult<()> {
        let start = Instant::now();
        ctx.config().normals.estimate_normals(input, output)?;
        ctx.diagnostics.timings.normal_extraction_us = micros_since(start);

        debug!(
            valid = output.valid_normal_count(),
            us = ctx.diagnostics.timings.normal_extraction_us,
            "Normals extracted"
        );
        if ctx.stores_intermediate() {
            ctx.diagnostics.normals = Some(output.clone());
        }
        Ok(())
    }

    /// Split a normal cloud into homogeneous regions on the host.
    ///
    /// # Errors
    ///
    /// Propagates the errors of
    /// [`NormalSplitter::split`](planeseg_split::NormalSplitter::split).
    pub fn split(normals: &Cloud, out: &mut Vec<NormalRegion>, ctx: &mut Context) -> SegResult<()> {
        let start = Instant::now();
        ctx.config().split.split(normals, out)?;
        ctx.diagnostics.timings.normal_split_us = micros_since(start);

        if ctx.stores_intermediate() {
            ctx.diagnostics.split = Some(out.clone());
        }
        Ok(())
    }

    /// Merge compatible adjacent regions.
    ///
    /// # Errors
    ///
    /// Propagates the errors of
    /// [`NormalMerger::merge`](planeseg_merge::NormalMerger::merge).
    pub fn merge(regions: &[NormalRegion], out: &mut Vec<MergedRegion>, ctx: &mut Context) -> SegResult<()> {
        let start = Instant::now();
        ctx.config().merge.merge(regions, out)?;
        ctx.diagnostics.timings.normal_merge_us = micros_since(start);

        if ctx.stores_intermediate() {
            ctx.diagnostics.merge = Some(out.clone());
        }
        Ok(())
    }

    /// Fit one plane per merged group over the finite points of `cloud`.
    ///
    /// `cloud` must be the organized cloud the groups were computed on.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for invalid fit parameters and
    /// [`SegError::DataShape`] if a group reaches outside the grid.
    pub fn fit_planes(
        cloud: &Cloud,
        groups: &[MergedRegion],
        out: &mut Vec<Plane>,
        ctx: &mut Context,
    ) -> SegResult<()> {
        let params = &ctx.config().fit;
        params.validate()?;
        cloud.validate_shape()?;
        if let Some(group) = groups
            .iter()
            .find(|g| g.bounds.right() > cloud.width || g.bounds.bottom() > cloud.height)
        {
            return Err(SegError::data_shape(format!(
                "group bounds {:?} exceed the {}x{} grid",
                group.bounds, cloud.width, cloud.height
            )));
        }

        let start = Instant::now();
        let planes = fit::fit_planes(cloud, groups, params);
        ctx.diagnostics.timings.plane_fit_us = micros_since(start);
        *out = planes;
        Ok(())
    }

    /// Segment an organized cloud already resident on the GPU.
    ///
    /// Normal estimation and splitting run on the device; merging and plane
    /// fitting run on the host over the small region lists. Results match
    /// [`segmentate`](Self::segmentate) within floating-point tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] for an invalid configuration or a
    /// context without GPU resources, [`SegError::DataShape`] for an
    /// unorganized cloud and [`SegError::Device`] for GPU failures, after
    /// which the host path can be used instead.
    #[cfg(feature = "gpu")]
    pub fn segmentate_device(input: &DeviceCloud, out: &mut Vec<Plane>, ctx: &mut Context) -> SegResult<()> {
        ctx.reset_diagnostics();
        ctx.config().validate()?;
        input.host_cloud().validate_organized()?;

        let mut normals = DeviceCloud::allocate_like(input, device_resources(ctx)?)?;
        Self::extract_normals_device(input, &mut normals, ctx)?;
        let mut regions = Vec::new();
        Self::split_device(&normals, &mut regions, ctx)?;
        let mut groups = Vec::new();
        Self::merge(&regions, &mut groups, ctx)?;
        let mut planes = Vec::new();
        Self::fit_planes(input.host_cloud(), &groups, &mut planes, ctx)?;

        info!(
            width = input.width(),
            height = input.height(),
            regions = regions.len(),
            planes = planes.len(),
            total_us = ctx.timings().total_us(),
            "Device segmentation complete"
        );
        *out = planes;
        Ok(())
    }

    /// Estimate normals on the GPU.
    ///
    /// The host copy of `output` is refreshed only when intermediate results
    /// are stored.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] without GPU resources, otherwise
    /// propagates the errors of [`estimate_normals_gpu`].
    #[cfg(feature = "gpu")]
    pub fn extract_normals_device(
        input: &DeviceCloud,
        output: &mut DeviceCloud,
        ctx: &mut Context,
    ) -> SegResult<()> {
        let start = Instant::now();
        let resources = device_resources(ctx)?;
        estimate_normals_gpu(&ctx.config().normals, input, output, resources)?;
        let stored = if ctx.stores_intermediate() {
            output.update_host(resources)?;
            Some(output.host_cloud().clone())
        } else {
            None
        };

        ctx.diagnostics.timings.normal_extraction_us = micros_since(start);
        ctx.diagnostics.normals = stored;
        Ok(())
    }

    /// Split a device normal cloud into homogeneous regions.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Configuration`] without GPU resources, otherwise
    /// propagates the errors of [`split_gpu`].
    #[cfg(feature = "gpu")]
    pub fn split_device(normals: &DeviceCloud, out: &mut Vec<NormalRegion>, ctx: &mut Context) -> SegResult<()> {
        let start = Instant::now();
        split_gpu(&ctx.config().split, normals, out, device_resources(ctx)?)?;
        ctx.diagnostics.timings.normal_split_us = micros_since(start);

        if ctx.stores_intermediate() {
            ctx.diagnostics.split = Some(out.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SegmentationConfig;
    use planeseg_types::{GridRect, Point};

    fn floor_and_wall() -> Cloud {
        // Left half a floor at z = 2, right half a ramp rising along x.
        Cloud::from_fn(24, 16, |c, r| {
            let x = c as f32 * 0.1;
            let z = if c < 12 { 2.0 } else { 2.0 + (x - 1.1) };
            Point::new(x, r as f32 * 0.1, z)
        })
    }

    #[test]
    fn test_intermediate_results_are_stored() {
        let mut ctx = Context::new(SegmentationConfig::default().with_store_intermediate_results(true));
        let mut planes = Vec::new();
        PlaneSegmentator::segmentate(&floor_and_wall(), &mut planes, &mut ctx).unwrap();

        assert!(ctx.last_organization_result().is_none());
        let normals = ctx.last_normal_extraction_result().unwrap();
        assert_eq!((normals.width, normals.height), (24, 16));
        assert!(!ctx.last_normal_split_result().unwrap().is_empty());
        assert_eq!(ctx.last_normal_merge_result().unwrap().len(), planes.len());
    }

    #[test]
    fn test_intermediate_results_off_by_default() {
        let mut ctx = Context::default();
        let mut planes = Vec::new();
        PlaneSegmentator::segmentate(&floor_and_wall(), &mut planes, &mut ctx).unwrap();
        assert!(ctx.last_normal_extraction_result().is_none());
        assert!(ctx.last_normal_split_result().is_none());
        assert!(!planes.is_empty());
    }

    #[test]
    fn test_unorganized_input_is_organized() {
        let grid = Cloud::from_fn(8, 8, |c, r| Point::new(c as f32 * 0.5, r as f32 * 0.5, 1.0));
        let scattered = Cloud::unorganized(grid.points);
        let mut ctx = Context::new(
            SegmentationConfig::default()
                .with_search_radius(0.8)
                .with_store_intermediate_results(true),
        );
        let mut planes = Vec::new();
        PlaneSegmentator::segmentate(&scattered, &mut planes, &mut ctx).unwrap();

        let organized = ctx.last_organization_result().unwrap();
        assert!(organized.is_organized());
        assert_eq!(organized.finite_count(), 64);
        assert_eq!(planes.len(), 1);
    }

    #[test]
    fn test_invalid_config_leaves_output() {
        let mut ctx = Context::default();
        let mut planes = vec![];
        PlaneSegmentator::segmentate(&floor_and_wall(), &mut planes, &mut ctx).unwrap();
        let before = planes.clone();

        let mut bad = Context::new(SegmentationConfig::default().with_search_radius(0.0));
        let err = PlaneSegmentator::segmentate(&floor_and_wall(), &mut planes, &mut bad);
        assert!(matches!(err, Err(SegError::Configuration { .. })));
        assert_eq!(planes, before);
    }

    #[test]
    fn test_fit_rejects_foreign_groups() {
        let cloud = Cloud::from_fn(4, 4, |c, r| Point::new(c as f32, r as f32, 0.0));
        let group = MergedRegion {
            regions: Vec::new(),
            normal: nalgebra::Vector3::z(),
            std_dev: nalgebra::Vector3::zeros(),
            dsv: 0.0,
            valid_count: 0,
            bounds: GridRect::new(2, 2, 4, 4),
        };
        let mut planes = Vec::new();
        let err = PlaneSegmentator::fit_planes(&cloud, &[group], &mut planes, &mut Context::default());
        assert!(matches!(err, Err(SegError::DataShape { .. })));
    }

    #[test]
    fn test_stage_timings_recorded() {
        let mut ctx = Context::default();
        let mut planes = Vec::new();
        PlaneSegmentator::segmentate(&floor_and_wall(), &mut planes, &mut ctx).unwrap();
        assert_eq!(ctx.timings().organization_us, 0);
        assert!(ctx.timings().total_us() >= ctx.timings().normal_extraction_us);
    }
}
