//! Device normal estimation.

use tracing::debug;

use planeseg_normals::NormalExtractor;
use planeseg_types::{SegError, SegResult};

use crate::buffers::{GpuNormalParams, WORKGROUP_SIZE, uniform_buffer};
use crate::device_cloud::DeviceCloud;
use crate::resources::DeviceResources;

/// Estimate normals of `input` into `output` on the GPU.
///
/// Produces the same normals as [`NormalExtractor::estimate_normals`], up to
/// `f32` rounding. `output` must share the input grid, usually from
/// [`DeviceCloud::allocate_like`]. Its host copy is reset to invalid normals
/// and refreshed by [`DeviceCloud::update_host`].
///
/// # Errors
///
/// Returns [`SegError::Configuration`] for an invalid extractor,
/// [`SegError::DataShape`] for an unorganized input or an output on a
/// different grid. Nothing is written on error.
#[allow(clippy::cast_possible_truncation)]
pub fn estimate_normals_gpu(
    extractor: &NormalExtractor,
    input: &DeviceCloud,
    output: &mut DeviceCloud,
    resources: &DeviceResources,
) -> SegResult<()> {
    let host = input.host_cloud();
    let levels = extractor.neighbor_levels_for(host)?;
    if output.dims() != input.dims() {
        return Err(SegError::data_shape(format!(
            "normal cloud is {}x{}, input is {}x{}",
            output.width(),
            output.height(),
            input.width(),
            input.height()
        )));
    }
    let view_point = extractor.view_point_for(host);
    let ctx = resources.context();

    // Upload checked the cell count against the binding limit, so the grid
    // fits in u32.
    let params = GpuNormalParams {
        width: input.width() as u32,
        height: input.height() as u32,
        levels: levels as u32,
        flip: u32::from(view_point.is_some()),
        view_point: view_point.map_or([0.0; 4], |p| [p.x, p.y, p.z, 0.0]),
        radius_sq: extractor.search_radius * extractor.search_radius,
        padding: [0.0; 3],
    };
    debug!(
        width = params.width,
        height = params.height,
        levels,
        flip = params.flip,
        "Estimating normals on GPU"
    );

    let params_buffer = uniform_buffer(ctx, "planeseg_normal_params", &params);
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("planeseg_normals_bind_group"),
        layout: &resources.normals_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: input.points_buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: input.valid_buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: output.points_buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: output.valid_buffer().as_entire_binding(),
            },
        ],
    });

    let groups = (input.len() as u32).div_ceil(WORKGROUP_SIZE);
    resources.dispatch(
        "planeseg_normals_pass",
        &resources.normals_pipeline,
        &bind_group,
        groups,
    );
    output.mark_host_stale(host);
    Ok(())
}
