//! Resource loading and management.
//!
//! This crate handles CPU-side assets:
//! - Texture decoding and mip chain generation
//! - Material definitions

mod error;
pub mod material;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use material::Material;
pub use texture::{MipLevel, TextureData};
