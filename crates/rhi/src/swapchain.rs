//! Swapchain and render target set.
//!
//! # Overview
//!
//! [`Swapchain`] owns the presentable back buffers, one image view per buffer
//! (the render target set), and the binary semaphores that order acquire,
//! render, and present on the queue:
//!
//! - [`current_back_buffer_index`](Swapchain::current_back_buffer_index)
//!   acquires the next image. The index is whatever the presentation engine
//!   hands out; it is never assumed to alternate. Until that image is
//!   presented, further calls return the same index.
//! - [`present`](Swapchain::present) hands the acquired image back to the
//!   display after the render-finished semaphore for that image signals.
//!
//! The present mode is fixed at creation from the sync interval: 1 or more
//! waits for vertical blank (FIFO), 0 presents immediately.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::swapchain::Swapchain;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR)
//! # -> Result<(), lumen_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(instance, device, surface, 1280, 720, 1)?;
//!
//! let index = swapchain.current_back_buffer_index()?;
//! // ... record into swapchain.render_target_view(index)? and submit, waiting on
//! // swapchain.acquire_semaphore() and signaling swapchain.render_finished_semaphore(index)? ...
//! swapchain.present(index, 1)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::Semaphore;

/// Number of back buffers requested from the presentation engine.
pub const BACK_BUFFER_COUNT: u32 = 2;

#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub struct Swapchain {
    // Semaphores go first: they may still be referenced by the swapchain's
    // last present when the struct is torn down after a device idle wait.
    acquire_semaphore: Semaphore,
    render_finished: Vec<Semaphore>,
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    render_target_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    sync_interval: u32,
    acquired: Option<u32>,
}

impl Swapchain {
    /// Creates the swapchain, its render target views and present-side
    /// semaphores.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be queried or any Vulkan object
    /// creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        sync_interval: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, sync_interval);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images requested",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        if images.len() != image_count as usize {
            warn!(
                "Presentation engine returned {} images ({} requested)",
                images.len(),
                image_count
            );
        }

        let render_target_views = create_render_target_views(&device, &images, surface_format.format)?;

        let acquire_semaphore = Semaphore::new(device.clone())?;
        let render_finished = (0..images.len())
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Swapchain created with {} back buffers", images.len());

        Ok(Self {
            acquire_semaphore,
            render_finished,
            device,
            swapchain_loader,
            swapchain,
            images,
            render_target_views,
            format: surface_format.format,
            extent,
            present_mode,
            sync_interval,
            acquired: None,
        })
    }

    /// Index of the back buffer to render into this frame.
    ///
    /// The first call after a present acquires a new image; later calls in
    /// the same frame return the cached index.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] if the swapchain is out of date (resizing
    /// is unsupported), [`RhiError::DeviceLost`] on device loss.
    pub fn current_back_buffer_index(&mut self) -> RhiResult<u32> {
        if let Some(index) = self.acquired {
            return Ok(index);
        }

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.acquire_semaphore.handle(),
                vk::Fence::null(),
            )
        };

        let index = match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired back buffer {} from a suboptimal swapchain", index);
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return Err(RhiError::SwapchainError(
                    "Swapchain out of date on acquire".to_string(),
                ));
            }
            Err(e) => return Err(RhiError::from_vk(e)),
        };

        self.acquired = Some(index);
        Ok(index)
    }

    /// The acquired-but-not-presented back buffer, if any.
    #[inline]
    pub fn acquired_index(&self) -> Option<u32> {
        self.acquired
    }

    /// Presents back buffer `index` on the device queue.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] if `index` is not the acquired buffer, if
    /// `sync_interval` differs from the one the swapchain was created with, or
    /// if the swapchain is out of date.
    pub fn present(&mut self, index: u32, sync_interval: u32) -> RhiResult<()> {
        if self.acquired != Some(index) {
            return Err(RhiError::SwapchainError(format!(
                "Presenting back buffer {} but {:?} is acquired",
                index, self.acquired
            )));
        }
        if sync_interval != self.sync_interval {
            return Err(RhiError::SwapchainError(format!(
                "Sync interval {} requested, swapchain was created for {}",
                sync_interval, self.sync_interval
            )));
        }

        let swapchains = [self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [self.render_finished[index as usize].handle()];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.queue(), &present_info)
        };
        self.acquired = None;

        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Presented back buffer {} to a suboptimal swapchain", index);
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainError(
                "Swapchain out of date on present".to_string(),
            )),
            Err(e) => Err(RhiError::from_vk(e)),
        }
    }

    /// Waited on by the frame submission before writing the back buffer.
    #[inline]
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_semaphore.handle()
    }

    /// Signaled by the frame submission, waited on by present.
    pub fn render_finished_semaphore(&self, index: u32) -> RhiResult<vk::Semaphore> {
        self.render_finished
            .get(index as usize)
            .map(Semaphore::handle)
            .ok_or_else(|| RhiError::InvalidHandle(format!("back buffer {}", index)))
    }

    /// Image view used as the color attachment for back buffer `index`.
    pub fn render_target_view(&self, index: u32) -> RhiResult<vk::ImageView> {
        self.render_target_views
            .get(index as usize)
            .copied()
            .ok_or_else(|| RhiError::InvalidHandle(format!("render target view {}", index)))
    }

    pub fn image(&self, index: u32) -> RhiResult<vk::Image> {
        self.images
            .get(index as usize)
            .copied()
            .ok_or_else(|| RhiError::InvalidHandle(format!("back buffer {}", index)))
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn sync_interval(&self) -> u32 {
        self.sync_interval
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for &view in &self.render_target_views {
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }

        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // The back buffer is written through an sRGB view so shader output is
    // linear.
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];

    for wanted in PREFERRED {
        if let Some(&format) = formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        {
            debug!("Selected surface format {:?} with SRGB_NONLINEAR", wanted);
            return format;
        }
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR], sync_interval: u32) -> vk::PresentModeKHR {
    if sync_interval == 0 {
        for mode in [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX] {
            if present_modes.contains(&mode) {
                debug!("Selected {:?} present mode (sync interval 0)", mode);
                return mode;
            }
        }
        warn!("No unsynchronized present mode available, falling back to FIFO");
    }

    // FIFO is guaranteed to be available.
    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Requests [`BACK_BUFFER_COUNT`], clamped to the surface limits.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = BACK_BUFFER_COUNT.max(capabilities.min_image_count);

    // 0 means no maximum.
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

fn create_render_target_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&create_info, None) };
        match view {
            Ok(view) => views.push(view),
            Err(e) => {
                for &created in &views {
                    unsafe { device.handle().destroy_image_view(created, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create render target view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} render target views", views.len());
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_accepts_rgba_srgb() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![surface_format(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_vsync_uses_fifo() {
        let modes = vec![
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&modes, 1), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_interval_zero_prefers_immediate() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes, 0), vk::PresentModeKHR::IMMEDIATE);

        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, 0), vk::PresentModeKHR::MAILBOX);

        let modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, 0), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 1280, 720);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_determine_image_count_requests_double_buffering() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        // Unlimited maximum.
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);
    }

    #[test]
    fn test_determine_image_count_respects_surface_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate.clone()
        };
        assert!(!no_modes.is_adequate());
    }
}
