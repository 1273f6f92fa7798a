//! Compile-time configuration.
//!
//! The renderer has no command-line flags and no persisted settings; every
//! knob is a constant here. [`RendererConfig`] groups the ones that are
//! threaded through constructors so tests can override them.

use std::time::Duration;

/// Client-area width of the window in pixels.
pub const WINDOW_WIDTH: u32 = 1280;
/// Client-area height of the window in pixels.
pub const WINDOW_HEIGHT: u32 = 720;
pub const WINDOW_TITLE: &str = "CG2";

/// Color the back buffer is cleared to at the start of every frame.
pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.25, 0.5, 1.0];
pub const CLEAR_DEPTH: f32 = 1.0;

/// 1 waits for vertical blank, 0 presents immediately.
pub const SYNC_INTERVAL: u32 = 1;

/// Upper bound on a single fence wait before the device is declared hung.
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial slot count of the render object arena. The arena grows past it.
pub const OBJECT_ARENA_CAPACITY: usize = 8;

/// Maximum number of descriptor sets the scene pass allocates.
pub const MAX_DESCRIPTOR_SETS: u32 = 64;

/// Settings threaded from the application into the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub sync_interval: u32,
    pub fence_timeout: Duration,
    /// Enable the validation layer and break on error-severity messages.
    pub validation: bool,
}

impl RendererConfig {
    /// Width over height, as used by the perspective projection.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            clear_color: CLEAR_COLOR,
            clear_depth: CLEAR_DEPTH,
            sync_interval: SYNC_INTERVAL,
            fence_timeout: FENCE_TIMEOUT,
            validation: cfg!(debug_assertions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = RendererConfig::default();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert_eq!(config.clear_color, [0.1, 0.25, 0.5, 1.0]);
        assert_eq!(config.sync_interval, 1);
        assert_eq!(config.validation, cfg!(debug_assertions));
    }

    #[test]
    fn test_aspect_ratio() {
        let config = RendererConfig::default();
        assert!((config.aspect_ratio() - 1280.0 / 720.0).abs() < f32::EPSILON);
    }
}
