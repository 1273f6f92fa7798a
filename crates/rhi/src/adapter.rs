//! Adapter (physical device) selection and device bootstrap.
//!
//! # Overview
//!
//! Bootstrap is a one-time walk over two ordered lists:
//! 1. Adapters, ranked by a high-performance preference. Software
//!    rasterizers are never considered.
//! 2. Feature levels, highest first. The first level the adapter accepts wins.
//!
//! The walk is written against [`AdapterSource`] so the fallback behavior can
//! be driven by a scripted source in tests; [`VulkanAdapters`] is the real
//! implementation.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::adapter::{DEFAULT_FEATURE_LEVELS, VulkanAdapters, bootstrap_device};
//! use lumen_rhi::instance::{Instance, ValidationConfig};
//! use ash::vk;
//!
//! let instance = Instance::new(&ValidationConfig::for_build()).expect("instance");
//! // Assume surface is created from a window
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null();
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let source = VulkanAdapters::new(&instance, surface, &surface_loader);
//! let bootstrapped = bootstrap_device(&source, DEFAULT_FEATURE_LEVELS).expect("device");
//! println!(
//!     "Using {} at feature level {}",
//!     bootstrapped.adapter.name, bootstrapped.feature_level
//! );
//! ```

use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Device API version tiers, tried from highest to lowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    Vulkan1_3,
    Vulkan1_4,
}

/// Candidate levels in the order they are attempted.
pub const DEFAULT_FEATURE_LEVELS: &[FeatureLevel] =
    &[FeatureLevel::Vulkan1_4, FeatureLevel::Vulkan1_3];

impl FeatureLevel {
    pub const HIGHEST: FeatureLevel = FeatureLevel::Vulkan1_4;

    /// The `VkApplicationInfo`-style packed version for this level.
    pub fn api_version(self) -> u32 {
        match self {
            FeatureLevel::Vulkan1_3 => vk::API_VERSION_1_3,
            FeatureLevel::Vulkan1_4 => vk::make_api_version(0, 1, 4, 0),
        }
    }

    /// Whether a device reporting `api_version` can run at this level.
    /// The patch number is ignored.
    pub fn supported_by(self, api_version: u32) -> bool {
        let wanted = self.api_version();
        (
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
        ) >= (vk::api_version_major(wanted), vk::api_version_minor(wanted))
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureLevel::Vulkan1_3 => write!(f, "1.3"),
            FeatureLevel::Vulkan1_4 => write!(f, "1.4"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    /// CPU rasterizers such as lavapipe or SwiftShader.
    Software,
    Other,
}

impl AdapterKind {
    pub fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
            vk::PhysicalDeviceType::CPU => AdapterKind::Software,
            _ => AdapterKind::Other,
        }
    }

    /// Higher is preferred; `None` means never selected.
    fn preference(self) -> Option<u32> {
        match self {
            AdapterKind::Discrete => Some(3),
            AdapterKind::Integrated => Some(2),
            AdapterKind::Virtual => Some(1),
            AdapterKind::Other => Some(0),
            AdapterKind::Software => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AdapterKind::Discrete => "Discrete GPU",
            AdapterKind::Integrated => "Integrated GPU",
            AdapterKind::Virtual => "Virtual GPU",
            AdapterKind::Software => "Software",
            AdapterKind::Other => "Other",
        }
    }
}

/// What bootstrap needs to know about an adapter to rank it.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterDesc {
    pub name: String,
    pub kind: AdapterKind,
    pub api_version: u32,
    pub device_local_memory: u64,
}

/// Orders adapters by preference and drops software adapters.
///
/// Returns indices into `descs`. Kind decides first, then device-local
/// memory, then enumeration order.
pub fn rank_adapters(descs: &[AdapterDesc]) -> Vec<usize> {
    let mut ranked: Vec<(usize, u32, u64)> = descs
        .iter()
        .enumerate()
        .filter_map(|(index, desc)| {
            let preference = desc.kind.preference();
            if preference.is_none() {
                debug!("Adapter '{}' skipped: software adapter", desc.name);
            }
            preference.map(|p| (index, p, desc.device_local_memory))
        })
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(index, _, _)| index).collect()
}

/// Enumerates adapters and creates devices on them.
pub trait AdapterSource {
    type Adapter;
    type Device;

    /// Adapters that passed the source's own suitability checks.
    fn adapters(&self) -> RhiResult<Vec<(AdapterDesc, Self::Adapter)>>;

    /// Attempt device creation at exactly `level`.
    fn create_device(&self, adapter: &Self::Adapter, level: FeatureLevel)
    -> RhiResult<Self::Device>;
}

/// A level an adapter turned down during bootstrap.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub adapter: String,
    pub level: FeatureLevel,
    pub reason: String,
}

/// Result of a successful bootstrap.
#[derive(Debug)]
pub struct Bootstrapped<D> {
    pub device: D,
    pub adapter: AdapterDesc,
    pub feature_level: FeatureLevel,
    /// Every attempt that failed before the winning one, in order.
    pub rejected: Vec<Rejection>,
}

/// Selects an adapter and creates a device at the highest level it accepts.
///
/// # Errors
///
/// - [`RhiError::NoSuitableGpu`] if no hardware adapter is available
/// - [`RhiError::NoSupportedFeatureLevel`] if every adapter rejected every level
pub fn bootstrap_device<S: AdapterSource>(
    source: &S,
    levels: &[FeatureLevel],
) -> RhiResult<Bootstrapped<S::Device>> {
    let mut adapters: Vec<Option<(AdapterDesc, S::Adapter)>> =
        source.adapters()?.into_iter().map(Some).collect();
    let descs: Vec<AdapterDesc> = adapters
        .iter()
        .flatten()
        .map(|(desc, _)| desc.clone())
        .collect();

    let order = rank_adapters(&descs);
    if order.is_empty() {
        warn!("No hardware adapter found");
        return Err(RhiError::NoSuitableGpu);
    }

    let mut rejected = Vec::new();

    for index in order {
        let Some((desc, adapter)) = adapters[index].take() else {
            continue;
        };

        for &level in levels {
            match source.create_device(&adapter, level) {
                Ok(device) => {
                    info!(
                        "Using adapter '{}' ({}) at feature level {}",
                        desc.name,
                        desc.kind.name(),
                        level
                    );
                    return Ok(Bootstrapped {
                        device,
                        adapter: desc,
                        feature_level: level,
                        rejected,
                    });
                }
                Err(e) => {
                    warn!(
                        "Adapter '{}' rejected feature level {}: {}",
                        desc.name, level, e
                    );
                    rejected.push(Rejection {
                        adapter: desc.name.clone(),
                        level,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    Err(RhiError::NoSupportedFeatureLevel)
}

/// Properties of a Vulkan adapter that passed the suitability checks.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// One family that supports both graphics and presentation.
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    pub fn desc(&self) -> AdapterDesc {
        AdapterDesc {
            name: self.device_name().to_string(),
            kind: AdapterKind::from_vk(self.properties.device_type),
            api_version: self.properties.api_version,
            device_local_memory: self.device_local_memory(),
        }
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field(
                "type",
                &AdapterKind::from_vk(self.properties.device_type).name(),
            )
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

/// [`AdapterSource`] over the physical devices of a real instance.
pub struct VulkanAdapters<'a> {
    instance: &'a Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &'a ash::khr::surface::Instance,
}

impl<'a> VulkanAdapters<'a> {
    pub fn new(
        instance: &'a Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &'a ash::khr::surface::Instance,
    ) -> Self {
        Self {
            instance,
            surface,
            surface_loader,
        }
    }

    fn check_suitability(&self, device: vk::PhysicalDevice) -> Option<PhysicalDeviceInfo> {
        let instance = self.instance.handle();
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        let name = properties
            .device_name_as_c_str()
            .map(CStr::to_string_lossy)
            .unwrap_or_default()
            .into_owned();

        let Some(queue_family) = self.find_queue_family(device) else {
            debug!(
                "Adapter '{}' skipped: no queue family with graphics and present",
                name
            );
            return None;
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .unwrap_or_default()
        };
        let has_swapchain = extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));
        if !has_swapchain {
            debug!("Adapter '{}' skipped: VK_KHR_swapchain missing", name);
            return None;
        }

        Some(PhysicalDeviceInfo {
            device,
            properties,
            memory_properties,
            queue_family,
        })
    }

    fn find_queue_family(&self, device: vk::PhysicalDevice) -> Option<u32> {
        let families = unsafe {
            self.instance
                .handle()
                .get_physical_device_queue_family_properties(device)
        };

        families
            .iter()
            .enumerate()
            .filter(|(_, family)| {
                family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(index, _)| index as u32)
            .find(|&index| unsafe {
                self.surface_loader
                    .get_physical_device_surface_support(device, index, self.surface)
                    .unwrap_or(false)
            })
    }
}

impl AdapterSource for VulkanAdapters<'_> {
    type Adapter = PhysicalDeviceInfo;
    type Device = Arc<Device>;

    fn adapters(&self) -> RhiResult<Vec<(AdapterDesc, PhysicalDeviceInfo)>> {
        let devices = unsafe { self.instance.handle().enumerate_physical_devices()? };
        info!("Found {} adapter(s)", devices.len());

        Ok(devices
            .into_iter()
            .filter_map(|device| self.check_suitability(device))
            .map(|info| (info.desc(), info))
            .collect())
    }

    fn create_device(
        &self,
        adapter: &PhysicalDeviceInfo,
        level: FeatureLevel,
    ) -> RhiResult<Arc<Device>> {
        let version = adapter.properties.api_version;
        if !level.supported_by(version) {
            return Err(RhiError::FeatureLevelUnsupported {
                level,
                reason: format!(
                    "device reports Vulkan {}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version)
                ),
            });
        }

        Device::new(self.instance, adapter, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn desc(name: &str, kind: AdapterKind, memory: u64) -> AdapterDesc {
        AdapterDesc {
            name: name.to_string(),
            kind,
            api_version: vk::API_VERSION_1_3,
            device_local_memory: memory,
        }
    }

    /// Scripted source: each adapter lists the levels it accepts.
    struct ScriptedSource {
        adapters: Vec<(AdapterDesc, Vec<FeatureLevel>)>,
        attempts: RefCell<Vec<(String, FeatureLevel)>>,
    }

    impl ScriptedSource {
        fn new(adapters: Vec<(AdapterDesc, Vec<FeatureLevel>)>) -> Self {
            Self {
                adapters,
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AdapterSource for ScriptedSource {
        type Adapter = usize;
        type Device = (String, FeatureLevel);

        fn adapters(&self) -> RhiResult<Vec<(AdapterDesc, usize)>> {
            Ok(self
                .adapters
                .iter()
                .enumerate()
                .map(|(i, (desc, _))| (desc.clone(), i))
                .collect())
        }

        fn create_device(
            &self,
            adapter: &usize,
            level: FeatureLevel,
        ) -> RhiResult<(String, FeatureLevel)> {
            let (desc, accepted) = &self.adapters[*adapter];
            self.attempts.borrow_mut().push((desc.name.clone(), level));
            if accepted.contains(&level) {
                Ok((desc.name.clone(), level))
            } else {
                Err(RhiError::FeatureLevelUnsupported {
                    level,
                    reason: "scripted".to_string(),
                })
            }
        }
    }

    #[test]
    fn test_feature_level_order_is_descending() {
        assert_eq!(DEFAULT_FEATURE_LEVELS[0], FeatureLevel::HIGHEST);
        assert!(DEFAULT_FEATURE_LEVELS.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_feature_level_supported_by() {
        assert!(FeatureLevel::Vulkan1_3.supported_by(vk::API_VERSION_1_3));
        assert!(FeatureLevel::Vulkan1_3.supported_by(vk::make_api_version(0, 1, 3, 250)));
        assert!(!FeatureLevel::Vulkan1_4.supported_by(vk::make_api_version(0, 1, 3, 280)));
        assert!(FeatureLevel::Vulkan1_4.supported_by(vk::make_api_version(0, 1, 4, 0)));
        assert!(!FeatureLevel::Vulkan1_3.supported_by(vk::API_VERSION_1_2));
    }

    #[test]
    fn test_rank_prefers_discrete_and_excludes_software() {
        let descs = vec![
            desc("llvmpipe", AdapterKind::Software, 0),
            desc("iGPU", AdapterKind::Integrated, 512),
            desc("dGPU", AdapterKind::Discrete, 8192),
        ];
        assert_eq!(rank_adapters(&descs), vec![2, 1]);
    }

    #[test]
    fn test_rank_breaks_ties_by_memory() {
        let descs = vec![
            desc("small", AdapterKind::Discrete, 4096),
            desc("large", AdapterKind::Discrete, 16384),
        ];
        assert_eq!(rank_adapters(&descs), vec![1, 0]);
    }

    #[test]
    fn test_bootstrap_falls_back_to_lower_level() {
        let source = ScriptedSource::new(vec![(
            desc("dGPU", AdapterKind::Discrete, 8192),
            vec![FeatureLevel::Vulkan1_3],
        )]);

        let result = bootstrap_device(&source, DEFAULT_FEATURE_LEVELS).unwrap();

        assert_eq!(result.feature_level, FeatureLevel::Vulkan1_3);
        assert_eq!(result.device, ("dGPU".to_string(), FeatureLevel::Vulkan1_3));
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].level, FeatureLevel::Vulkan1_4);
        assert_eq!(
            *source.attempts.borrow(),
            vec![
                ("dGPU".to_string(), FeatureLevel::Vulkan1_4),
                ("dGPU".to_string(), FeatureLevel::Vulkan1_3),
            ]
        );
    }

    #[test]
    fn test_bootstrap_takes_highest_level_first() {
        let source = ScriptedSource::new(vec![(
            desc("dGPU", AdapterKind::Discrete, 8192),
            vec![FeatureLevel::Vulkan1_4, FeatureLevel::Vulkan1_3],
        )]);

        let result = bootstrap_device(&source, DEFAULT_FEATURE_LEVELS).unwrap();
        assert_eq!(result.feature_level, FeatureLevel::Vulkan1_4);
        assert!(result.rejected.is_empty());
        assert_eq!(source.attempts.borrow().len(), 1);
    }

    #[test]
    fn test_bootstrap_moves_to_next_adapter() {
        let source = ScriptedSource::new(vec![
            (desc("iGPU", AdapterKind::Integrated, 512), vec![FeatureLevel::Vulkan1_3]),
            (desc("dGPU", AdapterKind::Discrete, 8192), vec![]),
        ]);

        let result = bootstrap_device(&source, DEFAULT_FEATURE_LEVELS).unwrap();
        assert_eq!(result.adapter.name, "iGPU");
        assert_eq!(result.rejected.len(), 3);
    }

    #[test]
    fn test_bootstrap_without_hardware_adapter() {
        let source = ScriptedSource::new(vec![(
            desc("llvmpipe", AdapterKind::Software, 0),
            vec![FeatureLevel::Vulkan1_3],
        )]);

        assert!(matches!(
            bootstrap_device(&source, DEFAULT_FEATURE_LEVELS),
            Err(RhiError::NoSuitableGpu)
        ));
        assert!(source.attempts.borrow().is_empty());
    }

    #[test]
    fn test_bootstrap_no_level_supported() {
        let source =
            ScriptedSource::new(vec![(desc("dGPU", AdapterKind::Discrete, 8192), vec![])]);

        assert!(matches!(
            bootstrap_device(&source, DEFAULT_FEATURE_LEVELS),
            Err(RhiError::NoSupportedFeatureLevel)
        ));
    }
}
