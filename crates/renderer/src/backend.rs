//! Seams between the frame protocol and the GPU.
//!
//! The orchestrator only speaks to these traits. [`VulkanBackend`] is the one
//! real implementation; tests drive the protocol with recording doubles.
//!
//! [`VulkanBackend`]: crate::vulkan::VulkanBackend

use std::time::Duration;

use lumen_rhi::RhiResult;

use crate::transition::ResourceState;

/// One state change of one back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub buffer: u32,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl TransitionBarrier {
    pub fn inverse(self) -> Self {
        Self {
            buffer: self.buffer,
            before: self.after,
            after: self.before,
        }
    }
}

/// The command allocator, command list and queue.
pub trait CommandContext {
    /// Recycles the allocator and reopens the list for recording.
    fn reset(&mut self) -> RhiResult<()>;

    /// Finishes recording.
    fn close(&mut self) -> RhiResult<()>;

    /// Submits the closed list to the queue.
    fn execute(&mut self) -> RhiResult<()>;

    fn barrier(&mut self, barrier: TransitionBarrier) -> RhiResult<()>;

    fn clear_depth(&mut self, depth: f32) -> RhiResult<()>;

    fn clear_color(&mut self, buffer: u32, color: [f32; 4]) -> RhiResult<()>;
}

/// Back-buffer queries and presentation.
pub trait SwapChainOps {
    fn buffer_count(&self) -> u32;

    /// Stable until the buffer is presented.
    fn current_back_buffer_index(&mut self) -> RhiResult<u32>;

    fn present(&mut self, buffer: u32, sync_interval: u32) -> RhiResult<()>;
}

/// Monotonic GPU counter.
pub trait TimelineFence {
    fn completed_value(&self) -> RhiResult<u64>;

    /// Enqueues a signal of `value` behind all submitted work.
    fn signal(&mut self, value: u64) -> RhiResult<()>;

    /// Blocks until `value` is reached; `Ok(false)` on timeout.
    fn wait(&mut self, value: u64, timeout: Duration) -> RhiResult<bool>;

    /// The GPU is hung or lost. Teardown must not block on it afterwards.
    fn mark_device_failed(&mut self) {}
}

/// Everything the orchestrator needs from one backend object.
pub trait FrameBackend: CommandContext + SwapChainOps + TimelineFence {}

impl<T: CommandContext + SwapChainOps + TimelineFence> FrameBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_inverse() {
        let barrier = TransitionBarrier {
            buffer: 1,
            before: ResourceState::Present,
            after: ResourceState::RenderTarget,
        };
        let inverse = barrier.inverse();
        assert_eq!(inverse.before, ResourceState::RenderTarget);
        assert_eq!(inverse.after, ResourceState::Present);
        assert_eq!(inverse.inverse(), barrier);
    }
}
