//! Frame core error types.

use std::fmt;

/// Errors that can occur in the frame scheduling core.
///
/// Device and driver failures (`ResourceCreationFailed`, `SubmissionFailed`,
/// `DeviceLost`) are not recoverable: callers are expected to log and
/// terminate rather than continue with a partially initialized device.
/// Everything else fails the single operation cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The device failed to create a physical resource.
    ResourceCreationFailed(String),
    /// Command list submission was rejected by the device.
    SubmissionFailed(String),
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "command submission failed: {msg}"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
        }
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = FrameError::ResourceCreationFailed("out of memory".to_string());
        assert_eq!(err.to_string(), "resource creation failed: out of memory");
    }
}
