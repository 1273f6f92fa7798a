//! Depth/stencil surface.
//!
//! One GPU-only image sized to the window, created at startup and never
//! resized. The format is the first of [`DEPTH_FORMAT_CANDIDATES`] the
//! adapter supports as an optimal-tiling depth/stencil attachment.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let depth = DepthBuffer::new(device, 1280, 720)?;
//! let view = depth.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use lumen_rhi::device::Device;
use lumen_rhi::image::{Image, ImageDesc};
use lumen_rhi::pipeline::has_stencil;
use lumen_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
];

/// Depth buffer for depth testing.
///
/// Immutable after creation. The layout transition out of `UNDEFINED`
/// happens on first use inside the frame backend.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates the depth buffer with the best supported format.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidHandle`] for zero dimensions
    /// - [`RhiError::PipelineError`] if no candidate format is supported
    /// - Image creation or allocation failures
    pub fn new(device: Arc<Device>, width: u32, height: u32) -> RhiResult<Self> {
        let format = device
            .find_supported_format(
                &DEPTH_FORMAT_CANDIDATES,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .ok_or_else(|| {
                RhiError::PipelineError("No supported depth/stencil format".to_string())
            })?;

        if format != DEPTH_FORMAT_CANDIDATES[0] {
            warn!(
                "{:?} unsupported, depth buffer falls back to {:?}",
                DEPTH_FORMAT_CANDIDATES[0], format
            );
        }

        Self::with_format(device, width, height, format)
    }

    /// Creates the depth buffer with an explicit format.
    pub fn with_format(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> RhiResult<Self> {
        let image = Image::new(
            device,
            ImageDesc {
                width,
                height,
                format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: depth_aspect(format),
                mip_levels: 1,
                name: "depth_buffer",
            },
        )?;

        info!("Created depth buffer: {}x{} ({:?})", width, height, format);

        Ok(Self { image })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn has_stencil(&self) -> bool {
        has_stencil(self.format())
    }

    /// Aspects covered by a layout barrier on this image.
    pub fn barrier_aspect(&self) -> vk::ImageAspectFlags {
        depth_aspect(self.format())
    }
}

pub(crate) fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_prefer_d24s8() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[2], vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_barrier_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
    }
}
