//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The renderer runs on exactly one queue. [`Device`] creates it from the
//! adapter's combined graphics/present family and enables the features the
//! frame protocol relies on:
//! - timeline semaphores (the frame fence)
//! - dynamic rendering and synchronization2
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::adapter::{DEFAULT_FEATURE_LEVELS, VulkanAdapters, bootstrap_device};
//! use lumen_rhi::instance::{Instance, ValidationConfig};
//! use ash::vk;
//!
//! let instance = Instance::new(&ValidationConfig::disabled()).expect("instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let source = VulkanAdapters::new(&instance, surface, &surface_loader);
//! let device = bootstrap_device(&source, DEFAULT_FEATURE_LEVELS)
//!     .expect("No suitable GPU found")
//!     .device;
//!
//! let queue = device.queue();
//! ```

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info, warn};

use crate::adapter::{FeatureLevel, PhysicalDeviceInfo};
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Logical device with its single queue and memory allocator.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    // Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queue: vk::Queue,
    queue_family: u32,
    feature_level: FeatureLevel,
    limits: vk::PhysicalDeviceLimits,
    // Set once the GPU is known to be hung or lost.
    failed: AtomicBool,
}

impl Device {
    /// Creates the logical device at `feature_level`.
    ///
    /// Callers normally reach this through
    /// [`bootstrap_device`](crate::adapter::bootstrap_device), which has
    /// already checked the adapter's API version against the level.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        adapter: &PhysicalDeviceInfo,
        feature_level: FeatureLevel,
    ) -> RhiResult<Arc<Self>> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(adapter.queue_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.device, &create_info, None)?
        };

        info!(
            "Logical device created at feature level {} with {} extension(s)",
            feature_level,
            DEVICE_EXTENSIONS.len()
        );

        let queue = unsafe { device.get_device_queue(adapter.queue_family, 0) };
        debug!("Queue retrieved from family {}", adapter.queue_family);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: adapter.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: adapter.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue,
            queue_family: adapter.queue_family,
            feature_level,
            limits: adapter.properties.limits,
            failed: AtomicBool::new(false),
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The one queue all work is submitted to and presented from.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    #[inline]
    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Locks the allocator, surfacing a poisoned lock as an error.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::BufferError("GPU allocator lock poisoned".to_string()))
    }

    /// First format in `candidates` whose optimal-tiling features contain
    /// `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let properties = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format)
            };
            properties.optimal_tiling_features.contains(features)
        })
    }

    /// Blocks until the queue drains.
    ///
    /// Skipped once [`mark_failed`](Self::mark_failed) has been called, since
    /// a hung GPU would never drain.
    pub fn wait_idle(&self) -> RhiResult<()> {
        if self.is_failed() {
            warn!("Skipping device idle wait: device is hung or lost");
            return Ok(());
        }
        unsafe { self.device.device_wait_idle() }.map_err(RhiError::from_vk)
    }

    /// Records that the GPU stopped making progress.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Submits to the device queue.
    ///
    /// # Safety
    ///
    /// Everything referenced by `submit_infos` must be valid and externally
    /// synchronized for the duration of the call.
    pub unsafe fn submit(&self, submit_infos: &[vk::SubmitInfo], fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.queue, submit_infos, fence) }
            .map_err(RhiError::from_vk)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Every allocation has been freed by its owner at this point.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, handles are Copy, and the allocator is
// behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert_eq!(DEVICE_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
