//! Vulkan instance management.
//!
//! This module handles VkInstance creation, the validation layer, and the
//! debug messenger that routes validation output into `tracing`.
//!
//! # Overview
//!
//! - [`Instance`] owns the entry, the instance and the optional messenger.
//! - [`ValidationConfig`] decides whether the validation layer is enabled and
//!   how its messages are treated.
//! - [`MessageFilter`] classifies each message as suppressed, logged, or a
//!   break. A break makes the offending Vulkan call fail with
//!   `VK_ERROR_VALIDATION_FAILED_EXT`, so errors surface at the call site
//!   instead of scrolling by in the log.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::{Instance, ValidationConfig};
//!
//! let instance = Instance::new(&ValidationConfig::for_build())
//!     .expect("Failed to create Vulkan instance");
//!
//! let vk_instance = instance.handle();
//! let entry = instance.entry();
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::adapter::FeatureLevel;
use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Message IDs that are known to be benign and are dropped.
///
/// The swapchain extent check races with the window system when the surface
/// size changes between the capability query and swapchain creation.
pub const SUPPRESSED_MESSAGE_IDS: &[&str] = &["VUID-VkSwapchainCreateInfoKHR-imageExtent-01274"];

/// Validation layer settings.
#[derive(Clone, Debug)]
pub struct ValidationConfig {
    /// Enable the Khronos validation layer and the debug messenger.
    pub enabled: bool,
    /// Message ID names that are never logged.
    pub suppressed_ids: Vec<String>,
    /// Fail the offending call on error-severity messages.
    pub break_on_error: bool,
}

impl ValidationConfig {
    /// Validation with error breaks in debug builds, nothing in release.
    pub fn for_build() -> Self {
        let debug = cfg!(debug_assertions);
        Self {
            enabled: debug,
            suppressed_ids: SUPPRESSED_MESSAGE_IDS.iter().map(|id| id.to_string()).collect(),
            break_on_error: debug,
        }
    }

    /// No validation layer at all.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            suppressed_ids: Vec::new(),
            break_on_error: false,
        }
    }
}

/// What to do with one validation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageAction {
    Suppress,
    Log,
    /// Log at error level and abort the call that produced the message.
    Break,
}

/// Classifies validation messages by severity and message ID.
#[derive(Clone, Debug, Default)]
pub struct MessageFilter {
    suppressed_ids: Vec<String>,
    break_on_error: bool,
}

impl MessageFilter {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            suppressed_ids: config.suppressed_ids.clone(),
            break_on_error: config.break_on_error,
        }
    }

    /// Suppression wins over severity, so a suppressed error never breaks.
    pub fn classify(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_id: Option<&str>,
    ) -> MessageAction {
        if let Some(id) = message_id
            && self.suppressed_ids.iter().any(|suppressed| suppressed == id)
        {
            return MessageAction::Suppress;
        }

        if self.break_on_error && severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            MessageAction::Break
        } else {
            MessageAction::Log
        }
    }
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    // Boxed so the pointer handed to the messenger stays put.
    _message_filter: Box<MessageFilter>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// The instance API version is the highest [`FeatureLevel`] so that every
    /// level can be attempted during device bootstrap.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(validation: &ValidationConfig) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            validation.enabled && Self::is_validation_layer_available(&entry)?;
        if validation.enabled && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let api_version = FeatureLevel::HIGHEST.api_version();
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"lumen")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"lumen")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(api_version);

        let mut extensions = Self::surface_extensions(&entry)?;
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API version {}.{})",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version)
        );

        let message_filter = Box::new(MessageFilter::new(validation));

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils, &message_filter)?;
            info!(
                "Validation enabled ({} suppressed message id(s), break on error: {})",
                validation.suppressed_ids.len(),
                validation.break_on_error
            );
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
            _message_filter: message_filter,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Surface extensions for this platform, filtered by what the loader
    /// actually exposes.
    fn surface_extensions(entry: &Entry) -> Result<Vec<*const c_char>, RhiError> {
        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let is_available = |name: &CStr| {
            available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == name))
        };

        let extensions: Vec<*const c_char> = Self::candidate_surface_extensions()
            .into_iter()
            .filter(|name| {
                let found = is_available(name);
                if !found {
                    debug!("Instance extension {:?} not available", name);
                }
                found
            })
            .map(CStr::as_ptr)
            .collect();

        Ok(extensions)
    }

    fn candidate_surface_extensions() -> Vec<&'static CStr> {
        let mut extensions = vec![ash::khr::surface::NAME];

        #[cfg(target_os = "windows")]
        extensions.push(ash::khr::win32_surface::NAME);

        #[cfg(target_os = "linux")]
        {
            extensions.push(ash::khr::xlib_surface::NAME);
            extensions.push(ash::khr::xcb_surface::NAME);
            extensions.push(ash::khr::wayland_surface::NAME);
        }

        #[cfg(target_os = "macos")]
        extensions.push(ash::ext::metal_surface::NAME);

        extensions
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        filter: &MessageFilter,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        // INFO and VERBOSE are never registered.
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(filter as *const MessageFilter as *mut std::ffi::c_void);

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Routes validation messages through the instance's [`MessageFilter`].
///
/// # Safety
///
/// Called by the loader. `user_data` is the boxed filter owned by the
/// [`Instance`], which outlives the messenger.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let filter = unsafe { &*(user_data as *const MessageFilter) };

    let message_id = if callback_data.p_message_id_name.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message_id_name) }
            .to_str()
            .ok()
    };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match filter.classify(message_severity, message_id) {
        MessageAction::Suppress => vk::FALSE,
        MessageAction::Break => {
            error!("[Vulkan {}] {} (aborting call)", type_str, message);
            vk::TRUE
        }
        MessageAction::Log => {
            if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
                error!("[Vulkan {}] {}", type_str, message);
            } else {
                warn!("[Vulkan {}] {}", type_str, message);
            }
            vk::FALSE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENIGN: &str = "VUID-VkSwapchainCreateInfoKHR-imageExtent-01274";

    fn debug_filter() -> MessageFilter {
        MessageFilter::new(&ValidationConfig {
            enabled: true,
            suppressed_ids: vec![BENIGN.to_string()],
            break_on_error: true,
        })
    }

    #[test]
    fn test_suppressed_id_is_dropped_even_at_error() {
        let filter = debug_filter();
        assert_eq!(
            filter.classify(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, Some(BENIGN)),
            MessageAction::Suppress
        );
    }

    #[test]
    fn test_error_breaks_when_enabled() {
        let filter = debug_filter();
        assert_eq!(
            filter.classify(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                Some("VUID-vkCmdDraw-None-02699")
            ),
            MessageAction::Break
        );
        assert_eq!(
            filter.classify(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, None),
            MessageAction::Break
        );
    }

    #[test]
    fn test_warning_is_logged() {
        let filter = debug_filter();
        assert_eq!(
            filter.classify(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, None),
            MessageAction::Log
        );
    }

    #[test]
    fn test_error_logged_without_break() {
        let filter = MessageFilter::new(&ValidationConfig {
            enabled: true,
            suppressed_ids: Vec::new(),
            break_on_error: false,
        });
        assert_eq!(
            filter.classify(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, None),
            MessageAction::Log
        );
    }

    #[test]
    fn test_build_config_suppresses_known_id() {
        let config = ValidationConfig::for_build();
        assert_eq!(config.suppressed_ids, vec![BENIGN.to_string()]);
        assert_eq!(config.enabled, cfg!(debug_assertions));
    }

    #[test]
    fn test_instance_creation_without_validation() {
        match Instance::new(&ValidationConfig::disabled()) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => {
                eprintln!("Skipping test: instance creation failed: {:?}", e);
            }
        }
    }

    #[test]
    fn test_candidate_surface_extensions() {
        let extensions = Instance::candidate_surface_extensions();
        assert_eq!(extensions[0], ash::khr::surface::NAME);

        #[cfg(target_os = "linux")]
        assert_eq!(extensions.len(), 4);

        #[cfg(any(target_os = "windows", target_os = "macos"))]
        assert_eq!(extensions.len(), 2);
    }
}
