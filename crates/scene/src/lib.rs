//! Scene components.
//!
//! This crate provides:
//! - Scale/rotate/translate transforms
//! - Perspective and sprite cameras

pub mod camera;
pub mod transform;

pub use camera::{Camera, Projection};
pub use transform::Transform;
