//! Error types for plane segmentation.

use thiserror::Error;

/// Result type for segmentation operations.
pub type SegResult<T> = Result<T, SegError>;

/// Errors that can occur while segmenting a point cloud.
///
/// Per-point and per-region degeneracies (too few neighbours, rank-deficient
/// fits, regions without valid normals) are absorbed by the pipeline and never
/// surface here. Every variant aborts the call that produced it and leaves the
/// caller's output untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SegError {
    /// A tunable is out of range, or the context cannot serve the requested path.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Cloud dimensions are inconsistent, within a cloud or between stages.
    #[error("invalid data shape: {reason}")]
    DataShape {
        /// Description of the mismatch.
        reason: String,
    },

    /// A fit could not be recovered and left no usable data.
    #[error("numeric degeneracy: {reason}")]
    NumericDegeneracy {
        /// Description of the degeneracy.
        reason: String,
    },

    /// The device (GPU) path failed.
    ///
    /// Callers can retry the same input on the host path.
    #[error("device error: {details}")]
    Device {
        /// Description of the device failure.
        details: String,
    },
}

impl SegError {
    /// Shorthand for a [`SegError::Configuration`] error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SegError::DataShape`] error.
    pub fn data_shape(reason: impl Into<String>) -> Self {
        Self::DataShape {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SegError::Device`] error.
    pub fn device(details: impl Into<String>) -> Self {
        Self::Device {
            details: details.into(),
        }
    }

    /// Returns `true` if this error came from the device path.
    #[must_use]
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = SegError::configuration("search radius must be positive");
        let msg = format!("{err}");
        assert!(msg.contains("invalid configuration"));
        assert!(msg.contains("search radius"));
    }

    #[test]
    fn test_data_shape_display() {
        let err = SegError::data_shape("12 points for a 4x4 grid");
        assert!(format!("{err}").contains("4x4"));
    }

    #[test]
    fn test_numeric_degeneracy_display() {
        let err = SegError::NumericDegeneracy {
            reason: "collinear support".to_string(),
        };
        assert!(format!("{err}").contains("collinear"));
    }

    #[test]
    fn test_device_classification() {
        assert!(SegError::device("no adapter").is_device());
        assert!(!SegError::configuration("x").is_device());
        assert!(!SegError::data_shape("x").is_device());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SegError>();
    }
}
