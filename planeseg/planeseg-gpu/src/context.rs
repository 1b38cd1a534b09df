//! The shared wgpu device.
//!
//! Every [`DeviceResources`](crate::DeviceResources) in the process compiles
//! its pipelines on one device, requested the first time anything asks for
//! it. When no adapter can be found, that outcome is cached too, so callers
//! can probe cheaply and stay on the host path.
//!
//! # Example
//!
//! ```no_run
//! use planeseg_gpu::context::GpuContext;
//!
//! match GpuContext::get() {
//!     Some(ctx) => println!(
//!         "{} ({}), {} cells per binding",
//!         ctx.adapter_info.name,
//!         ctx.adapter_info.backend,
//!         ctx.limits.max_elements(16)
//!     ),
//!     None => println!("segmenting on the host"),
//! }
//! ```

use std::sync::OnceLock;

use tracing::{debug, info, warn};
use wgpu::{Adapter, Device, DeviceDescriptor, Instance, Queue, RequestAdapterOptions};

use crate::error::{GpuError, GpuResult};

static SHARED: OnceLock<Option<GpuContext>> = OnceLock::new();

/// The adapter behind the shared device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuAdapterInfo {
    /// Adapter name as reported by the driver.
    pub name: String,

    /// `DiscreteGpu`, `IntegratedGpu`, `Cpu`, ...
    pub device_type: String,

    /// `Vulkan`, `Metal`, `Dx12`, `Gl`, ...
    pub backend: String,
}

impl GpuAdapterInfo {
    fn describe(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            device_type: format!("{:?}", info.device_type),
            backend: format!("{:?}", info.backend),
        }
    }

    /// Whether the adapter is a software rasterizer.
    ///
    /// Such adapters work but are usually slower than the host path.
    #[must_use]
    pub fn is_software(&self) -> bool {
        self.device_type == "Cpu"
    }
}

/// The device limits that size cloud buffers and dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeLimits {
    /// Largest storage buffer binding, in bytes.
    pub max_storage_binding: u32,

    /// Largest workgroup count along one dispatch dimension.
    pub max_workgroups_per_dimension: u32,
}

impl ComputeLimits {
    const fn of(limits: &wgpu::Limits) -> Self {
        Self {
            max_storage_binding: limits.max_storage_buffer_binding_size,
            max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        }
    }

    /// How many `element_size`-byte elements fit in one storage binding.
    #[must_use]
    pub const fn max_elements(&self, element_size: usize) -> usize {
        self.max_storage_binding as usize / element_size
    }
}

/// The shared device and queue.
///
/// Use [`GpuContext::get`] to probe for a device and
/// [`GpuContext::try_get`] where a missing GPU is an error.
pub struct GpuContext {
    /// Device the pipelines and buffers are created on.
    pub device: Device,

    /// Queue for uploads and compute submissions.
    pub queue: Queue,

    /// The adapter the device was requested from.
    pub adapter_info: GpuAdapterInfo,

    /// Limits granted to the device.
    pub limits: ComputeLimits,
}

impl GpuContext {
    /// The shared context, requested on first call.
    ///
    /// Returns `None` when no adapter or device could be acquired.
    #[must_use]
    pub fn get() -> Option<&'static Self> {
        SHARED
            .get_or_init(|| match pollster::block_on(Self::request()) {
                Ok(ctx) => {
                    info!(
                        adapter = %ctx.adapter_info.name,
                        backend = %ctx.adapter_info.backend,
                        max_storage_binding = ctx.limits.max_storage_binding,
                        "GPU device ready for segmentation"
                    );
                    if ctx.adapter_info.is_software() {
                        warn!(adapter = %ctx.adapter_info.name, "Using a software GPU adapter");
                    }
                    Some(ctx)
                }
                Err(e) => {
                    warn!(error = %e, "No GPU device, device path disabled");
                    None
                }
            })
            .as_ref()
    }

    /// The shared context, or an error when there is no GPU.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] if no device could be acquired.
    pub fn try_get() -> GpuResult<&'static Self> {
        Self::get().ok_or(GpuError::NotAvailable)
    }

    /// Whether a GPU device could be acquired.
    #[must_use]
    pub fn is_available() -> bool {
        Self::get().is_some()
    }

    async fn request() -> GpuResult<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(GpuError::NotAvailable)?;

        let adapter_info = GpuAdapterInfo::describe(&adapter.get_info());
        debug!(
            name = %adapter_info.name,
            device_type = %adapter_info.device_type,
            backend = %adapter_info.backend,
            "GPU adapter found"
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("planeseg-gpu"),
                    required_features: wgpu::Features::empty(),
                    required_limits: cloud_limits(&adapter),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Execution(format!("device request failed: {e}")))?;

        let limits = ComputeLimits::of(&device.limits());
        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
        })
    }
}

/// Default limits, raised to the adapter's buffer sizes so that full
/// sensor frames fit in one binding.
fn cloud_limits(adapter: &Adapter) -> wgpu::Limits {
    let supported = adapter.limits();
    let defaults = wgpu::Limits::default();
    wgpu::Limits {
        max_storage_buffer_binding_size: supported
            .max_storage_buffer_binding_size
            .max(defaults.max_storage_buffer_binding_size),
        max_buffer_size: supported.max_buffer_size.max(defaults.max_buffer_size),
        ..defaults
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter_info", &self.adapter_info)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_cached() {
        let first = GpuContext::get().map(std::ptr::from_ref);
        let second = GpuContext::get().map(std::ptr::from_ref);
        assert_eq!(first, second);
        assert_eq!(GpuContext::try_get().is_ok(), first.is_some());
    }

    #[test]
    fn test_software_adapter() {
        let mut info = GpuAdapterInfo {
            name: "llvmpipe".to_string(),
            device_type: "Cpu".to_string(),
            backend: "Vulkan".to_string(),
        };
        assert!(info.is_software());
        info.device_type = "DiscreteGpu".to_string();
        assert!(!info.is_software());
    }

    #[test]
    fn test_max_elements() {
        let limits = ComputeLimits::of(&wgpu::Limits::default());
        assert_eq!(limits.max_elements(16), (128 << 20) / 16);
        assert_eq!(limits.max_workgroups_per_dimension, 65535);
    }
}
