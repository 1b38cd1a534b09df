//! Device region splitting.

use nalgebra::Vector3;
use tracing::debug;

use planeseg_split::{NormalSplitter, RegionMoments, SplitDecision, sort_regions};
use planeseg_types::{GridRect, NormalRegion, SegResult};

use crate::buffers::{
    GpuMoments, GpuRegion, GpuStatsParams, read_buffer, storage_buffer, uniform_buffer,
    zeroed_storage_buffer,
};
use crate::device_cloud::DeviceCloud;
use crate::error::GpuResult;
use crate::resources::DeviceResources;

/// Split a device normal cloud into homogeneous regions.
///
/// Window statistics are reduced on the GPU, one workgroup per window, and
/// every split decision goes through [`NormalSplitter::decide`], so the
/// regions match [`NormalSplitter::split`] on the same normals. `out` is
/// sorted by `(y, x)` and only written on success.
///
/// # Errors
///
/// Returns [`SegError::Configuration`](planeseg_types::SegError::Configuration)
/// for an invalid splitter,
/// [`SegError::DataShape`](planeseg_types::SegError::DataShape) for an
/// unorganized cloud and
/// [`SegError::Device`](planeseg_types::SegError::Device) if a readback fails.
pub fn split_gpu(
    splitter: &NormalSplitter,
    normals: &DeviceCloud,
    out: &mut Vec<NormalRegion>,
    resources: &DeviceResources,
) -> SegResult<()> {
    splitter.validate()?;
    normals.host_cloud().validate_organized()?;

    let pass = StatsPass { normals, resources };
    let batch_limit = resources
        .context()
        .limits
        .max_elements(std::mem::size_of::<GpuMoments>())
        .max(1);

    let mut leaves = Vec::new();
    let mut pending = vec![GridRect::new(0, 0, normals.width(), normals.height())];
    let mut levels = 0usize;

    while !pending.is_empty() {
        let mut decisions = Vec::with_capacity(pending.len());
        for batch in pending.chunks(batch_limit) {
            decisions.extend(pass.decide(splitter, batch)?);
        }
        pending = splitter.apply_decisions(decisions, &mut leaves);
        levels += 1;
    }

    sort_regions(&mut leaves);
    debug!(regions = leaves.len(), levels, "Normal cloud split on GPU");
    *out = leaves;
    Ok(())
}

struct StatsPass<'a> {
    normals: &'a DeviceCloud,
    resources: &'a DeviceResources,
}

impl StatsPass<'_> {
    /// Decisions for one batch of windows, in batch order.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn decide(&self, splitter: &NormalSplitter, batch: &[GridRect]) -> GpuResult<Vec<SplitDecision>> {
        let ctx = self.resources.context();
        let count = batch.len();
        let regions: Vec<GpuRegion> = batch.iter().map(GpuRegion::from_rect).collect();
        let params = GpuStatsParams::new(
            self.normals.width() as u32,
            self.normals.height() as u32,
            count as u32,
        );

        let region_buffer = storage_buffer(ctx, "planeseg_regions", &regions);
        let params_buffer = uniform_buffer(ctx, "planeseg_stats_params", &params);
        let means_buffer = zeroed_storage_buffer::<[f32; 4]>(ctx, "planeseg_region_means", count);
        let moments_buffer = zeroed_storage_buffer::<GpuMoments>(ctx, "planeseg_region_moments", count);
        let deviation_buffer = zeroed_storage_buffer::<f32>(ctx, "planeseg_region_deviation", count);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("planeseg_region_stats_bind_group"),
            layout: &self.resources.stats_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.normals.points_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.normals.valid_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: region_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: means_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: moments_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: deviation_buffer.as_entire_binding(),
                },
            ],
        });

        self.resources.dispatch(
            "planeseg_region_moments_pass",
            &self.resources.moments_pipeline,
            &bind_group,
            count as u32,
        );
        let moments: Vec<RegionMoments> = read_buffer::<GpuMoments>(ctx, &moments_buffer)?
            .iter()
            .map(to_moments)
            .collect();

        let means: Vec<Option<Vector3<f32>>> =
            moments.iter().map(RegionMoments::mean_normal).collect();
        let packed: Vec<[f32; 4]> = means
            .iter()
            .map(|m| m.map_or([0.0; 4], |v| [v.x, v.y, v.z, 1.0]))
            .collect();
        ctx.queue
            .write_buffer(&means_buffer, 0, bytemuck::cast_slice(&packed));

        self.resources.dispatch(
            "planeseg_region_deviation_pass",
            &self.resources.deviation_pipeline,
            &bind_group,
            count as u32,
        );
        let deviations: Vec<f32> = read_buffer(ctx, &deviation_buffer)?;

        Ok(batch
            .iter()
            .zip(&moments)
            .zip(&means)
            .zip(deviations)
            .map(|(((rect, m), mean), sum)| {
                let deviation_sum = if mean.is_some() {
                    f64::from(sum)
                } else {
                    // Normals cancel out: every one is a quarter turn from the null mean.
                    m.count as f64 * std::f64::consts::FRAC_PI_2
                };
                splitter.decide(*rect, m, deviation_sum)
            })
            .collect())
    }
}

fn to_moments(raw: &GpuMoments) -> RegionMoments {
    RegionMoments {
        count: raw.count as usize,
        sum: Vector3::from(raw.sum).cast::<f64>(),
        sum_sq: Vector3::from(raw.sum_sq).cast::<f64>(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use planeseg_split::stats::{window_deviation_sum, window_moments};
    use planeseg_types::{Cloud, Point};

    /// Compensated `f32` sum, accumulated the way the statistics shader does.
    fn compensated(values: impl Iterator<Item = f32>) -> f32 {
        let (mut sum, mut carry) = (0.0f32, 0.0f32);
        for x in values {
            let y = x - carry;
            let t = sum + y;
            carry = (t - sum) - y;
            sum = t;
        }
        sum - carry
    }

    /// Decision from single-precision window sums, as read back from the device.
    fn decide_from_f32(splitter: &NormalSplitter, normals: &Cloud, rect: GridRect) -> SplitDecision {
        let mut cells = Vec::new();
        for row in rect.y..rect.bottom() {
            for col in rect.x..rect.right() {
                let p = &normals.points[normals.index(col, row)];
                if p.has_valid_normal() {
                    cells.push(p.coords());
                }
            }
        }
        let sum = |i: usize| compensated(cells.iter().map(|n| n[i]));
        let sum_sq = |i: usize| compensated(cells.iter().map(|n| n[i] * n[i]));
        #[allow(clippy::cast_possible_truncation)]
        let raw = GpuMoments::new(
            [sum(0), sum(1), sum(2)],
            cells.len() as u32,
            [sum_sq(0), sum_sq(1), sum_sq(2)],
        );
        let moments = to_moments(&raw);
        let mean = moments.mean_normal().unwrap();
        let deviation = compensated(cells.iter().map(|n| n.dot(&mean).clamp(-1.0, 1.0).acos()));
        splitter.decide(rect, &moments, f64::from(deviation))
    }

    fn rippled(width: usize, height: usize) -> Cloud {
        Cloud::from_fn(width, height, |c, r| {
            let (a, b) = (c as f32 * 0.37, r as f32 * 0.53);
            Point::normal(Vector3::new(0.05 * a.sin(), 0.05 * b.cos(), 1.0).normalize())
        })
    }

    #[test]
    fn test_to_moments() {
        let raw = GpuMoments::new([0.0, 0.0, 4.0], 4, [0.0, 0.0, 4.0]);
        let m = to_moments(&raw);
        assert_eq!(m.count, 4);
        assert_relative_eq!(m.mean_normal().unwrap_or_else(Vector3::zeros), Vector3::z());
        assert_relative_eq!(m.std_dev(), Vector3::zeros());
    }

    #[test]
    fn test_single_precision_sums_match_host_decisions() {
        let normals = rippled(320, 240);
        let rect = GridRect::new(0, 0, 320, 240);

        let moments = window_moments(&normals, rect);
        let mean = moments.mean_normal().unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let dsv = (window_deviation_sum(&normals, rect, &mean) / moments.count as f64) as f32;

        for factor in [0.99_f32, 1.01] {
            let splitter = NormalSplitter::default().with_std_dsv_threshold(dsv * factor);
            let host = splitter.evaluate(&normals, rect);
            let device = decide_from_f32(&splitter, &normals, rect);
            match (host, device) {
                (SplitDecision::Split(a, b), SplitDecision::Split(c, d)) => {
                    assert_eq!((a, b), (c, d));
                }
                (SplitDecision::Leaf(h), SplitDecision::Leaf(d)) => {
                    assert_eq!((h.rect, h.valid_count), (d.rect, d.valid_count));
                    assert_relative_eq!(h.normal, d.normal, epsilon = 1e-6);
                    assert_relative_eq!(h.dsv, d.dsv, max_relative = 1e-4);
                    assert_relative_eq!(h.std_dev, d.std_dev, epsilon = 1e-3);
                }
                (h, d) => panic!("factor {factor}: host {h:?}, device {d:?}"),
            }
        }
    }
}
