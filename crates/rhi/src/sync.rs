//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`]: binary GPU-to-GPU signal (acquire and present ordering)
//! - [`Fence`]: binary GPU-to-CPU signal for one-off uploads
//! - [`TimelineSemaphore`]: the frame fence, a monotonically increasing
//!   64-bit counter the queue advances and the CPU can poll or wait on
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::sync::TimelineSemaphore;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let fence = TimelineSemaphore::new(device.clone(), 0)?;
//!
//! // After submitting a frame:
//! fence.signal_on_queue(1)?;
//! if fence.completed_value()? < 1 {
//!     let reached = fence.wait(1, Duration::from_secs(5))?;
//!     assert!(reached);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Binary semaphore for ordering queue operations.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Binary fence the host can wait on.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`RhiError::VulkanError`] with `TIMEOUT` if the fence did not signal
    /// in time, [`RhiError::DeviceLost`] if the device went away.
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, duration_to_nanos(timeout))
        }
        .map_err(RhiError::from_vk)
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// Timeline semaphore used as the frame fence.
///
/// The counter only moves forward. [`signal_on_queue`](Self::signal_on_queue)
/// enqueues the signal behind all previously submitted work on the device
/// queue, so the value is reached only after that work retires.
pub struct TimelineSemaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl TimelineSemaphore {
    /// Creates a timeline semaphore with the given initial counter value.
    pub fn new(device: Arc<Device>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created timeline semaphore (initial value {})", initial_value);

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// The highest value the GPU has reached.
    pub fn completed_value(&self) -> RhiResult<u64> {
        unsafe {
            self.device
                .handle()
                .get_semaphore_counter_value(self.semaphore)
        }
        .map_err(RhiError::from_vk)
    }

    /// Enqueues a signal of `value` on the device queue.
    ///
    /// This is an empty submission carrying only the timeline signal.
    pub fn signal_on_queue(&self, value: u64) -> RhiResult<()> {
        let signal_semaphores = [self.semaphore];
        let signal_values = [value];

        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe { self.device.submit(&[submit_info], vk::Fence::null()) }
    }

    /// Blocks until the counter reaches `value` or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    ///
    /// # Errors
    ///
    /// [`RhiError::DeviceLost`] if the device was lost during the wait.
    pub fn wait(&self, value: u64, timeout: Duration) -> RhiResult<bool> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        match unsafe {
            self.device
                .handle()
                .wait_semaphores(&wait_info, duration_to_nanos(timeout))
        } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(RhiError::from_vk(e)),
        }
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// Safety: the wrappers hold an Arc<Device> and plain handles. Queue access
// goes through the device and is externally synchronized by the single render
// thread.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}
unsafe impl Send for Fence {}
unsafe impl Sync for Fence {}
unsafe impl Send for TimelineSemaphore {}
unsafe impl Sync for TimelineSemaphore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<TimelineSemaphore>();
    }

    #[test]
    fn test_duration_to_nanos() {
        assert_eq!(duration_to_nanos(Duration::from_millis(5)), 5_000_000);
        assert_eq!(duration_to_nanos(Duration::MAX), u64::MAX);
    }
}
