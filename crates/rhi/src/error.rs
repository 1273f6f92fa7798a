//! RHI-specific error types.

use thiserror::Error;

use crate::adapter::FeatureLevel;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No hardware adapter passed the suitability checks.
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Every adapter rejected every feature level candidate.
    #[error("No adapter supports any of the requested feature levels")]
    NoSupportedFeatureLevel,

    /// The adapter cannot create a device at this feature level.
    #[error("Feature level {level} unsupported: {reason}")]
    FeatureLevelUnsupported { level: FeatureLevel, reason: String },

    /// The device was lost while the CPU was waiting on it.
    #[error("Device lost")]
    DeviceLost,

    /// Shader loading or compilation error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Buffer creation or mapping error
    #[error("Buffer error: {0}")]
    BufferError(String),
}

impl RhiError {
    /// Maps `VK_ERROR_DEVICE_LOST` to [`RhiError::DeviceLost`] and wraps
    /// everything else.
    pub fn from_vk(result: ash::vk::Result) -> Self {
        if result == ash::vk::Result::ERROR_DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::VulkanError(result)
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
