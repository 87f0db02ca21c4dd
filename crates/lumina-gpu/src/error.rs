//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Instance or device enumeration yielded nothing usable.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Memory allocation failed or no suitable memory type exists.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// An operation was invoked outside the recording state it requires.
    #[error("Invalid recording state: expected {expected}, recorder is {actual}")]
    InvalidRecordingState {
        expected: &'static str,
        actual: &'static str,
    },

    /// A caller-side contract was violated (mismatched sizes, aspect masks, ...).
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
