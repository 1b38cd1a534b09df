//! GPU error types.

use planeseg_types::SegError;
use thiserror::Error;

/// Failures of the device path.
///
/// Every variant converts into [`SegError::Device`], so pipeline callers see a
/// single device failure kind and can retry on the host.
///
/// # Example
///
/// ```
/// use planeseg_gpu::error::GpuError;
/// use planeseg_types::SegError;
///
/// let err: SegError = GpuError::NotAvailable.into();
/// assert!(err.is_device());
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GpuError {
    /// No compatible adapter was found.
    ///
    /// Typical on headless machines without GPU drivers.
    #[error("no GPU adapter available for the device path")]
    NotAvailable,

    /// Command submission or device creation failed.
    #[error("GPU execution error: {0}")]
    Execution(String),

    /// Reading a buffer back to the host failed.
    #[error("reading device buffer back failed: {0}")]
    BufferMapping(String),

    /// A cloud does not fit in a single storage buffer binding.
    #[error("{points} cells exceed the {max} a storage binding holds")]
    CloudTooLarge {
        /// Cells in the cloud.
        points: usize,
        /// Cells one binding can hold.
        max: usize,
    },
}

/// Result alias for the device path.
pub type GpuResult<T> = Result<T, GpuError>;

impl From<GpuError> for SegError {
    fn from(err: GpuError) -> Self {
        Self::device(err.to_string())
    }
}
