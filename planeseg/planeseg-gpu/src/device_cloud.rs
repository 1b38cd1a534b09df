//! Clouds resident in GPU storage buffers.

use planeseg_types::{Cloud, Point, SegResult};
use wgpu::Buffer;

use crate::buffers::{decode_points, encode_points, read_buffer, storage_buffer, zeroed_storage_buffer};
use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};
use crate::resources::DeviceResources;

/// Bytes per cell in the points buffer.
const CELL_BYTES: usize = std::mem::size_of::<[f32; 4]>();

/// A cloud uploaded to the GPU.
///
/// Cells are stored as a byte copy of the host points, so an upload followed
/// by a download returns the same cloud bit for bit, `NaN` cells included.
/// Because shaders cannot test for `NaN` reliably, validity travels in a
/// parallel `u32` mask.
///
/// The host cloud it was created from is kept alongside. Device stages that
/// write into a `DeviceCloud` leave that copy stale until
/// [`update_host`](Self::update_host) is called.
///
/// # Example
///
/// ```no_run
/// use planeseg_gpu::{DeviceCloud, DeviceResources};
/// use planeseg_types::{Cloud, Point};
///
/// let resources = DeviceResources::acquire().unwrap();
/// let cloud = Cloud::from_fn(4, 4, |c, r| Point::new(c as f32, r as f32, 1.0));
///
/// let device = DeviceCloud::upload(&cloud, &resources).unwrap();
/// assert_eq!(device.download(&resources).unwrap(), cloud);
/// ```
pub struct DeviceCloud {
    host: Cloud,
    points: Buffer,
    valid: Buffer,
}

fn check_capacity(ctx: &GpuContext, points: usize) -> GpuResult<()> {
    let max = ctx.limits.max_elements(CELL_BYTES);
    if points > max {
        return Err(GpuError::CloudTooLarge { points, max });
    }
    Ok(())
}

impl DeviceCloud {
    /// Upload `cloud`. Finite cells are marked valid.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::DataShape`](planeseg_types::SegError::DataShape)
    /// for an empty or mis-sized cloud, and
    /// [`SegError::Device`](planeseg_types::SegError::Device) if it does not
    /// fit in a storage buffer.
    pub fn upload(cloud: &Cloud, resources: &DeviceResources) -> SegResult<Self> {
        cloud.validate_shape()?;
        let ctx = resources.context();
        check_capacity(ctx, cloud.len())?;

        let (raw, mask) = encode_points(&cloud.points, Point::is_finite);
        Ok(Self {
            host: cloud.clone(),
            points: storage_buffer(ctx, "planeseg_points", &raw),
            valid: storage_buffer(ctx, "planeseg_valid", &mask),
        })
    }

    /// Allocate an output cloud on the grid of `other`.
    ///
    /// Every cell starts as an invalid normal, on the device and in the host
    /// copy.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Device`](planeseg_types::SegError::Device) if the
    /// buffers exceed device limits.
    pub fn allocate_like(other: &Self, resources: &DeviceResources) -> SegResult<Self> {
        let ctx = resources.context();
        let len = other.len();
        check_capacity(ctx, len)?;
        Ok(Self {
            host: other.host.normal_cloud_like(),
            points: zeroed_storage_buffer::<[f32; 4]>(ctx, "planeseg_points", len),
            valid: zeroed_storage_buffer::<u32>(ctx, "planeseg_valid", len),
        })
    }

    /// Read the device contents back into a new host cloud.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Device`](planeseg_types::SegError::Device) if the
    /// readback fails.
    pub fn download(&self, resources: &DeviceResources) -> SegResult<Cloud> {
        let raw: Vec<[f32; 4]> = read_buffer(resources.context(), &self.points)?;
        Ok(Cloud {
            points: decode_points(&raw),
            width: self.host.width,
            height: self.host.height,
            sensor_origin: self.host.sensor_origin,
        })
    }

    /// Refresh the host copy from the device.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::Device`](planeseg_types::SegError::Device) if the
    /// readback fails. The host copy is unchanged on error.
    pub fn update_host(&mut self, resources: &DeviceResources) -> SegResult<()> {
        self.host = self.download(resources)?;
        Ok(())
    }

    /// The host copy.
    #[must_use]
    pub const fn host_cloud(&self) -> &Cloud {
        &self.host
    }

    /// Grid columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.host.width
    }

    /// Grid rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.host.height
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.len()
    }

    /// Whether the cloud has no cells. Never true for an uploaded cloud.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub(crate) const fn dims(&self) -> (usize, usize) {
        (self.host.width, self.host.height)
    }

    pub(crate) const fn points_buffer(&self) -> &Buffer {
        &self.points
    }

    pub(crate) const fn valid_buffer(&self) -> &Buffer {
        &self.valid
    }

    /// Replace the host copy after a device stage rewrote the buffers.
    pub(crate) fn mark_host_stale(&mut self, template: &Cloud) {
        self.host = template.normal_cloud_like();
    }
}

impl std::fmt::Debug for DeviceCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCloud")
            .field("width", &self.host.width)
            .field("height", &self.host.height)
            .field("bytes", &self.points.size())
            .finish_non_exhaustive()
    }
}
