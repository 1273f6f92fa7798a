//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps `ash` for the renderer. It handles:
//! - Instance creation with the validation message filter
//! - Adapter enumeration and feature level bootstrap
//! - Device, queue and allocator
//! - Swapchain and render target views
//! - Command pools and buffers, binary and timeline semaphores, fences
//! - Buffers, images, textures, shaders, descriptors and pipelines

mod error;

pub mod adapter;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
