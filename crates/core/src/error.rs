//! Error types shared by the platform and application layers.

use thiserror::Error;

/// Error type for everything outside the GPU wrappers.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan object creation failed outside the RHI (surface, extensions).
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or handle retrieval failed.
    #[error("Window error: {0}")]
    Window(String),

    /// A configuration value is unusable, such as a zero-sized window.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
