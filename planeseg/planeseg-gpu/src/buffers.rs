//! Buffer layouts shared with the WGSL shaders, and transfer helpers.
//!
//! # Memory Layout
//!
//! - points: `vec4<f32>` per cell (16 bytes), a byte copy of the host point
//! - validity: `u32` per cell, `1` when the cell takes part in statistics
//! - [`GpuNormalParams`]: 48 bytes (uniform)
//! - [`GpuRegion`]: 16 bytes
//! - [`GpuStatsParams`]: 16 bytes (uniform)
//! - [`GpuMoments`]: 32 bytes

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages};

use planeseg_types::{GridRect, Point};

use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};

/// Threads per workgroup in every shader.
pub const WORKGROUP_SIZE: u32 = 256;

/// Uniform parameters of the normal-estimation shader.
///
/// # Example
///
/// ```
/// use planeseg_gpu::buffers::GpuNormalParams;
///
/// assert_eq!(std::mem::size_of::<GpuNormalParams>(), 48);
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuNormalParams {
    /// Grid columns.
    pub width: u32,
    /// Grid rows.
    pub height: u32,
    /// Window radius in cells.
    pub levels: u32,
    /// `1` to orient normals toward `view_point`.
    pub flip: u32,
    /// View point (xyz) + padding.
    pub view_point: [f32; 4],
    /// Squared search radius around each centre point.
    pub radius_sq: f32,
    /// Pads the struct to the uniform's 16-byte alignment.
    pub padding: [f32; 3],
}

/// A pending window, as read by the statistics shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuRegion {
    /// First column.
    pub x: u32,
    /// First row.
    pub y: u32,
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
}

impl GpuRegion {
    /// Convert a host window. Grid sizes are bounded by the cloud size check.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_rect(rect: &GridRect) -> Self {
        Self {
            x: rect.x as u32,
            y: rect.y as u32,
            width: rect.width as u32,
            height: rect.height as u32,
        }
    }
}

/// Uniform parameters of the statistics shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuStatsParams {
    /// Grid columns.
    pub width: u32,
    /// Grid rows.
    pub height: u32,
    /// Number of windows in the batch.
    pub region_count: u32,
    _padding: u32,
}

impl GpuStatsParams {
    /// Parameters for a batch of `region_count` windows.
    #[must_use]
    pub const fn new(width: u32, height: u32, region_count: u32) -> Self {
        Self {
            width,
            height,
            region_count,
            _padding: 0,
        }
    }
}

/// Per-window moments written by the statistics shader.
///
/// Matches the WGSL struct `{ sum: vec3<f32>, count: u32, sum_sq: vec3<f32> }`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMoments {
    /// Sum of the valid normals.
    pub sum: [f32; 3],
    /// Number of valid normals.
    pub count: u32,
    /// Per-component sum of squares.
    pub sum_sq: [f32; 3],
    _padding: u32,
}

impl GpuMoments {
    /// Moments with the given sums.
    #[must_use]
    pub const fn new(sum: [f32; 3], count: u32, sum_sq: [f32; 3]) -> Self {
        Self {
            sum,
            count,
            sum_sq,
            _padding: 0,
        }
    }
}

/// Raw cell data and validity mask for `points`.
///
/// The cell data is copied value by value, so NaN payloads are preserved.
#[must_use]
pub fn encode_points(points: &[Point], valid: impl Fn(&Point) -> bool) -> (Vec<[f32; 4]>, Vec<u32>) {
    let raw = points.iter().map(|p| [p.x, p.y, p.z, p.aux]).collect();
    let mask = points.iter().map(|p| u32::from(valid(p))).collect();
    (raw, mask)
}

/// Rebuild points from raw cell data.
#[must_use]
pub fn decode_points(raw: &[[f32; 4]]) -> Vec<Point> {
    raw.iter()
        .map(|&[x, y, z, aux]| Point { x, y, z, aux })
        .collect()
}

/// Create a storage buffer initialized with `contents`.
pub fn storage_buffer<T: Pod>(ctx: &GpuContext, label: &str, contents: &[T]) -> Buffer {
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(contents),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        })
}

/// Create a zero-filled storage buffer of `len` elements of `T`.
pub fn zeroed_storage_buffer<T: Pod>(ctx: &GpuContext, label: &str, len: usize) -> Buffer {
    ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (len * std::mem::size_of::<T>()) as u64,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Create a uniform buffer holding `value`.
pub fn uniform_buffer<T: Pod>(ctx: &GpuContext, label: &str, value: &T) -> Buffer {
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        })
}

/// Copy `buffer` back to the host.
///
/// # Errors
///
/// Returns [`GpuError::BufferMapping`] if the readback fails.
pub fn read_buffer<T: Pod>(ctx: &GpuContext, buffer: &Buffer) -> GpuResult<Vec<T>> {
    let buffer_size = buffer.size();

    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("planeseg_staging"),
        size: buffer_size,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("planeseg_download"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer_size);
    ctx.queue.submit([encoder.finish()]);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    ctx.device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|_| GpuError::BufferMapping("channel closed".into()))?
        .map_err(|e| GpuError::BufferMapping(format!("{e:?}")))?;

    let data = slice.get_mapped_range();
    let values = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();

    Ok(values)
}

/// Workgroup grid covering `groups` workgroups.
///
/// Spills into the second dimension past the per-dimension limit. Shaders
/// flatten the index with `num_workgroups.x` and skip the excess.
#[must_use]
pub fn dispatch_grid(groups: u32, max_per_dimension: u32) -> (u32, u32) {
    let max = max_per_dimension.max(1);
    if groups <= max {
        (groups.max(1), 1)
    } else {
        (max, groups.div_ceil(max))
    }
}
