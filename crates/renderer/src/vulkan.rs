//! Vulkan implementation of the frame backend seams.
//!
//! [`VulkanBackend`] bundles the objects one frame touches: the swapchain and
//! its render target views, the depth buffer, the command pool and its single
//! command buffer, and the timeline semaphore used as the frame fence.
//!
//! Protocol states map onto image layouts:
//!
//! | State          | Layout                     |
//! |----------------|----------------------------|
//! | `Present`      | `PRESENT_SRC_KHR`          |
//! | `RenderTarget` | `COLOR_ATTACHMENT_OPTIMAL` |
//!
//! A swapchain image that has never been rendered is still `UNDEFINED`, so
//! its first `Present -> RenderTarget` barrier starts from there. Clears and
//! draws happen inside one dynamic rendering scope that is opened lazily and
//! ended before any barrier or the final `vkEndCommandBuffer`.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info};

use lumen_core::RendererConfig;
use lumen_rhi::command::{CommandBuffer, CommandPool};
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::swapchain::Swapchain;
use lumen_rhi::sync::TimelineSemaphore;
use lumen_rhi::{RhiError, RhiResult};

use crate::backend::{CommandContext, SwapChainOps, TimelineFence, TransitionBarrier};
use crate::depth_buffer::DepthBuffer;
use crate::transition::ResourceState;

pub struct VulkanBackend {
    depth: DepthBuffer,
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    fence: TimelineSemaphore,
    swapchain: Swapchain,
    device: Arc<Device>,
    image_initialized: Vec<bool>,
    depth_initialized: bool,
    active_target: Option<u32>,
    rendering: bool,
}

impl VulkanBackend {
    /// Creates the swapchain, depth buffer, command pool/buffer and fence.
    ///
    /// # Errors
    ///
    /// Returns the first Vulkan or allocation failure.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        config: &RendererConfig,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(
            instance,
            device.clone(),
            surface,
            config.width,
            config.height,
            config.sync_interval,
        )?;

        let fence = TimelineSemaphore::new(device.clone(), 0)?;
        let command_pool = CommandPool::new(device.clone(), device.queue_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        let extent = swapchain.extent();
        let depth = DepthBuffer::new(device.clone(), extent.width, extent.height)?;

        info!(
            "Vulkan frame backend ready: {} back buffers {:?}, depth {:?}",
            swapchain.buffer_count(),
            swapchain.format(),
            depth.format()
        );

        Ok(Self {
            image_initialized: vec![false; swapchain.buffer_count()],
            depth,
            command_buffer,
            command_pool,
            fence,
            swapchain,
            device,
            depth_initialized: false,
            active_target: None,
            rendering: false,
        })
    }

    /// The command buffer inside the open rendering scope, with the viewport
    /// and scissor covering the whole back buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if no back buffer is a render target.
    pub fn recorder(&mut self) -> RhiResult<&CommandBuffer> {
        self.ensure_rendering()?;

        let extent = self.swapchain.extent();
        self.command_buffer.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.command_buffer.set_scissor(&full_rect(extent));

        Ok(&self.command_buffer)
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth
    }

    fn ensure_rendering(&mut self) -> RhiResult<()> {
        if self.rendering {
            return Ok(());
        }
        let buffer = self.active_target.ok_or_else(|| {
            RhiError::InvalidHandle("No back buffer is in the render target state".to_string())
        })?;

        self.command_buffer.transition_image_layout(
            self.depth.image(),
            depth_layout_before(self.depth_initialized),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            self.depth.barrier_aspect(),
            1,
        );
        self.depth_initialized = true;

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.render_target_view(buffer)?)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth.image_view())
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(full_rect(self.swapchain.extent()))
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);
        if self.depth.has_stencil() {
            rendering_info = rendering_info.stencil_attachment(&depth_attachment);
        }

        self.command_buffer.begin_rendering(&rendering_info);
        self.rendering = true;
        Ok(())
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            self.command_buffer.end_rendering();
            self.rendering = false;
        }
    }

    fn clear_rect(&self) -> vk::ClearRect {
        vk::ClearRect {
            rect: full_rect(self.swapchain.extent()),
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Depth contents are discarded on first use and kept afterwards.
fn depth_layout_before(initialized: bool) -> vk::ImageLayout {
    if initialized {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::UNDEFINED
    }
}

fn color_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }
}

impl CommandContext for VulkanBackend {
    fn reset(&mut self) -> RhiResult<()> {
        self.command_pool.reset()?;
        self.command_buffer.begin()
    }

    fn close(&mut self) -> RhiResult<()> {
        self.end_rendering();
        self.command_buffer.end()
    }

    fn execute(&mut self) -> RhiResult<()> {
        let index = self.swapchain.acquired_index().ok_or_else(|| {
            RhiError::SwapchainError("Executing a frame without an acquired back buffer".to_string())
        })?;

        let wait_semaphores = [self.swapchain.acquire_semaphore()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer.handle()];
        let signal_semaphores = [self.swapchain.render_finished_semaphore(index)?];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { self.device.submit(&[submit_info], vk::Fence::null()) }
    }

    fn barrier(&mut self, barrier: TransitionBarrier) -> RhiResult<()> {
        self.end_rendering();

        let image = self.swapchain.image(barrier.buffer)?;
        let first_use = self
            .image_initialized
            .get_mut(barrier.buffer as usize)
            .ok_or_else(|| RhiError::InvalidHandle(format!("back buffer {}", barrier.buffer)))?;

        let old_layout = if *first_use {
            color_layout(barrier.before)
        } else {
            vk::ImageLayout::UNDEFINED
        };
        *first_use = true;

        self.command_buffer.transition_image_layout(
            image,
            old_layout,
            color_layout(barrier.after),
            vk::ImageAspectFlags::COLOR,
            1,
        );

        self.active_target = match barrier.after {
            ResourceState::RenderTarget => Some(barrier.buffer),
            ResourceState::Present => None,
        };
        Ok(())
    }

    fn clear_depth(&mut self, depth: f32) -> RhiResult<()> {
        self.ensure_rendering()?;

        let attachment = vk::ClearAttachment {
            aspect_mask: self.depth.barrier_aspect(),
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
        };
        self.command_buffer
            .clear_attachments(&[attachment], &[self.clear_rect()]);
        Ok(())
    }

    fn clear_color(&mut self, buffer: u32, color: [f32; 4]) -> RhiResult<()> {
        if self.active_target != Some(buffer) {
            return Err(RhiError::InvalidHandle(format!(
                "Clearing back buffer {} while {:?} is the render target",
                buffer, self.active_target
            )));
        }
        self.ensure_rendering()?;

        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        };
        self.command_buffer
            .clear_attachments(&[attachment], &[self.clear_rect()]);
        Ok(())
    }
}

impl SwapChainOps for VulkanBackend {
    fn buffer_count(&self) -> u32 {
        self.swapchain.buffer_count() as u32
    }

    fn current_back_buffer_index(&mut self) -> RhiResult<u32> {
        self.swapchain.current_back_buffer_index()
    }

    fn present(&mut self, buffer: u32, sync_interval: u32) -> RhiResult<()> {
        self.swapchain.present(buffer, sync_interval)
    }
}

impl TimelineFence for VulkanBackend {
    fn completed_value(&self) -> RhiResult<u64> {
        self.fence.completed_value()
    }

    fn signal(&mut self, value: u64) -> RhiResult<()> {
        self.fence.signal_on_queue(value)
    }

    fn wait(&mut self, value: u64, timeout: Duration) -> RhiResult<bool> {
        self.fence.wait(value, timeout)
    }

    fn mark_device_failed(&mut self) {
        self.device.mark_failed();
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle: {}", e);
        }
        debug!("Destroying Vulkan frame backend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_layouts() {
        assert_eq!(
            color_layout(ResourceState::Present),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            color_layout(ResourceState::RenderTarget),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_depth_layout_before() {
        assert_eq!(depth_layout_before(false), vk::ImageLayout::UNDEFINED);
        assert_eq!(
            depth_layout_before(true),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_full_rect() {
        let rect = full_rect(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.extent.width, 1280);
        assert_eq!(rect.extent.height, 720);
    }
}
