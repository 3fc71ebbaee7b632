//! Plot Engine - a run-loop manager for immediate-mode plotting
//!
//! Application code registers draw callbacks from any thread; a frame loop,
//! run inline or on a background thread, invokes them every frame inside an
//! egui context and presents the result to a window.
//!
//! # Features
//! - Lock-free drawer snapshots with copy-on-write registration
//! - Idempotent surface init/deinit with rollback of partial initialization
//! - Start, stop, wait and detach control of a background frame loop
//! - Plot helpers built on `egui_plot`
//! - Two backends: **wgpu** with a winit window (`native`) and a headless
//!   call-recording backend for tests (`dummy`)

pub mod backend;
pub mod controller;
pub mod egui_integration;
pub mod engine;
pub mod error;
pub mod plot;
pub mod registry;

mod frame;
mod lifecycle;
mod rollback;

#[cfg(feature = "native")]
pub mod window;

use std::time::Duration;

pub use controller::{LoopState, StopToken};
pub use egui_integration::{DrawData, UiContext};
pub use engine::PlotEngine;
pub use error::{EngineError, EngineResult};
pub use registry::{DrawEntry, DrawerId, DrawerRegistry, DrawerSnapshot};

#[cfg(feature = "native")]
pub use backend::wgpu_backend::WgpuPlatform;

#[cfg(feature = "dummy")]
pub use backend::dummy::DummyPlatform;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the plot engine.
pub fn init() {
    log::info!("Plot Engine v{}", VERSION);
}

/// Configuration for a [`PlotEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title used when the surface is created
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Minimum number of presentable images
    pub min_image_count: u32,
    /// How long the loop sleeps while the window is minimized or zero-sized
    pub idle_sleep: Duration,
    /// Background color, straight alpha
    pub clear_color: [f32; 4],
    /// Use the dark widget theme
    pub dark_theme: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Plot Engine".to_string(),
            width: 1600,
            height: 1000,
            min_image_count: 2,
            idle_sleep: Duration::from_millis(10),
            clear_color: [0.45, 0.55, 0.60, 1.00],
            dark_theme: true,
        }
    }
}

impl EngineConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_min_image_count(mut self, count: u32) -> Self {
        self.min_image_count = count;
        self
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_dark_theme(mut self, dark_theme: bool) -> Self {
        self.dark_theme = dark_theme;
        self
    }

    /// Check the configuration for values no surface can be built with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.min_image_count < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "min_image_count must be at least 2, got {}",
                self.min_image_count
            )));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(EngineError::InvalidConfig(
                "clear_color components must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.title, "Plot Engine");
        assert_eq!((config.width, config.height), (1600, 1000));
        assert_eq!(config.min_image_count, 2);
    }

    #[rstest]
    #[case::zero_width(EngineConfig::default().with_size(0, 100))]
    #[case::zero_height(EngineConfig::default().with_size(100, 0))]
    #[case::single_image(EngineConfig::default().with_min_image_count(1))]
    #[case::nan_color(EngineConfig::default().with_clear_color([f32::NAN, 0.0, 0.0, 1.0]))]
    fn test_invalid_config(#[case] config: EngineConfig) {
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_title("t")
            .with_size(10, 20)
            .with_min_image_count(3)
            .with_idle_sleep(Duration::from_millis(1))
            .with_dark_theme(false);
        assert_eq!(config.title, "t");
        assert_eq!((config.width, config.height), (10, 20));
        assert_eq!(config.min_image_count, 3);
        assert_eq!(config.idle_sleep, Duration::from_millis(1));
        assert!(!config.dark_theme);
    }
}
