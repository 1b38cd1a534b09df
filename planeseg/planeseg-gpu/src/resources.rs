//! Compiled pipelines for the device path.

use tracing::debug;
use wgpu::{BindGroupLayout, ComputePipeline};

use crate::buffers::dispatch_grid;
use crate::context::GpuContext;
use crate::error::GpuResult;

const NORMALS_SHADER: &str = include_str!("shaders/normals.wgsl");
const REGION_STATS_SHADER: &str = include_str!("shaders/region_stats.wgsl");

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    ctx: &GpuContext,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> ComputePipeline {
    ctx.device
        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            module,
            entry_point: Some(entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
}

/// Device pipelines and bind group layouts used by the device path.
///
/// Build one per segmentation context that should run on the GPU and reuse
/// it across calls. Pipelines are released when it is dropped.
///
/// # Example
///
/// ```no_run
/// use planeseg_gpu::DeviceResources;
///
/// match DeviceResources::acquire() {
///     Ok(resources) => println!("GPU: {}", resources.context().adapter_info.name),
///     Err(e) => eprintln!("host path only: {e}"),
/// }
/// ```
pub struct DeviceResources {
    ctx: &'static GpuContext,
    pub(crate) normals_layout: BindGroupLayout,
    pub(crate) normals_pipeline: ComputePipeline,
    pub(crate) stats_layout: BindGroupLayout,
    pub(crate) moments_pipeline: ComputePipeline,
    pub(crate) deviation_pipeline: ComputePipeline,
}

impl DeviceResources {
    /// Compile the pipelines on the process-wide GPU context.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`](crate::GpuError::NotAvailable) if no
    /// GPU is available.
    pub fn acquire() -> GpuResult<Self> {
        Ok(Self::new(GpuContext::try_get()?))
    }

    /// Compile the pipelines on `ctx`.
    #[must_use]
    pub fn new(ctx: &'static GpuContext) -> Self {
        debug!("Creating segmentation compute pipelines");

        let normals_module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("planeseg_normals"),
                source: wgpu::ShaderSource::Wgsl(NORMALS_SHADER.into()),
            });
        let normals_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("planeseg_normals_layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    uniform_entry(2),
                    storage_entry(3, false),
                    storage_entry(4, false),
                ],
            });
        let normals_pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("planeseg_normals_pipeline_layout"),
                    bind_group_layouts: &[&normals_layout],
                    push_constant_ranges: &[],
                });
        let normals_pipeline = compute_pipeline(
            ctx,
            "planeseg_normals_pipeline",
            &normals_pipeline_layout,
            &normals_module,
            "estimate_normals",
        );

        let stats_module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("planeseg_region_stats"),
                source: wgpu::ShaderSource::Wgsl(REGION_STATS_SHADER.into()),
            });
        let stats_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("planeseg_region_stats_layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    uniform_entry(3),
                    storage_entry(4, true),
                    storage_entry(5, false),
                    storage_entry(6, false),
                ],
            });
        let stats_pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("planeseg_region_stats_pipeline_layout"),
                    bind_group_layouts: &[&stats_layout],
                    push_constant_ranges: &[],
                });
        let moments_pipeline = compute_pipeline(
            ctx,
            "planeseg_region_moments_pipeline",
            &stats_pipeline_layout,
            &stats_module,
            "region_moments",
        );
        let deviation_pipeline = compute_pipeline(
            ctx,
            "planeseg_region_deviation_pipeline",
            &stats_pipeline_layout,
            &stats_module,
            "region_deviation",
        );

        Self {
            ctx,
            normals_layout,
            normals_pipeline,
            stats_layout,
            moments_pipeline,
            deviation_pipeline,
        }
    }

    /// The GPU context the pipelines were compiled on.
    #[must_use]
    pub const fn context(&self) -> &'static GpuContext {
        self.ctx
    }

    /// Record and submit one compute pass of `groups` workgroups.
    pub(crate) fn dispatch(
        &self,
        label: &str,
        pipeline: &ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: u32,
    ) {
        let (x, y) = dispatch_grid(groups, self.ctx.limits.max_workgroups_per_dimension);
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        self.ctx.queue.submit([encoder.finish()]);
    }
}

impl std::fmt::Debug for DeviceResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceResources")
            .field("context", self.ctx)
            .finish_non_exhaustive()
    }
}
