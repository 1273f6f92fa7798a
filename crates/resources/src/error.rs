//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Pixel data does not match the stated dimensions.
    #[error("Invalid texture: {0}")]
    InvalidTexture(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
