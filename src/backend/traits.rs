//! Collaborator traits for windowing and frame presentation
//!
//! The engine never talks to an OS window or a graphics API directly. A
//! [`Platform`] creates the window and the device, the window pumps input,
//! and the [`FrameDevice`] owns the presentable surface and per-frame work.
//! Both the wgpu backend and the dummy backend implement these traits.

use thiserror::Error;

use crate::egui_integration::DrawData;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create window: {0}")]
    WindowCreationFailed(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to set up surface resources: {0}")]
    SurfaceSetupFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
    #[error("{0}")]
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Framebuffer dimensions in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero extent in either dimension cannot be presented.
    pub fn is_presentable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl From<(u32, u32)> for Extent {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Outcome of acquiring the next presentable image.
#[derive(Debug)]
pub enum Acquire<F> {
    /// The frame can be rendered and presented.
    Ready(F),
    /// The frame is usable but the surface should be rebuilt.
    Suboptimal(F),
    /// The surface no longer matches the window; nothing was acquired.
    Outdated,
}

/// Outcome of presenting a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    Outdated,
}

/// OS window and input pump.
pub trait PlatformWindow: Send {
    /// Process pending OS events.
    fn poll_events(&mut self);

    /// Whether the user asked to close the window.
    fn should_close(&self) -> bool;

    /// Current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> Extent;

    fn is_iconified(&self) -> bool;

    fn set_title(&mut self, title: &str);

    /// Check that the calling thread may pump this window's events.
    ///
    /// Windows whose events are delivered only to the thread that created
    /// them report any other thread as an error. The default accepts every
    /// thread.
    fn check_thread(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Bind the widget context to this window's input.
    fn attach_ui(&mut self, _ctx: &egui::Context) {}

    /// Release whatever [`attach_ui`](Self::attach_ui) bound.
    fn detach_ui(&mut self) {}

    /// Input for the next widget frame.
    ///
    /// The default reports only the screen rectangle, sized to the framebuffer.
    fn take_ui_input(&mut self) -> egui::RawInput {
        let size = self.framebuffer_size();
        egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(size.width as f32, size.height as f32),
            )),
            ..Default::default()
        }
    }

    /// Apply cursor, clipboard and similar requests from the widget frame.
    fn handle_ui_output(&mut self, _output: egui::PlatformOutput) {}
}

/// Graphics device owning the presentable surface and per-frame resources.
///
/// Per-frame resources are touched only by the thread running the frame loop.
pub trait FrameDevice: Send {
    type Window: PlatformWindow;
    type Surface: Send;
    type Frame;

    fn create_surface(&mut self, window: &Self::Window) -> BackendResult<Self::Surface>;

    fn destroy_surface(&mut self, surface: Self::Surface);

    /// Build swapchain-equivalent resources sized to `extent`.
    fn setup_surface_resources(
        &mut self,
        surface: &mut Self::Surface,
        extent: Extent,
        min_image_count: u32,
    ) -> BackendResult<()>;

    fn teardown_surface_resources(&mut self, surface: &mut Self::Surface);

    /// Recreate surface resources after a resize or an outdated surface.
    fn resize_surface_resources(
        &mut self,
        surface: &mut Self::Surface,
        extent: Extent,
        min_image_count: u32,
    ) -> BackendResult<()> {
        self.teardown_surface_resources(surface);
        self.setup_surface_resources(surface, extent, min_image_count)
    }

    fn acquire_frame(&mut self, surface: &mut Self::Surface)
        -> BackendResult<Acquire<Self::Frame>>;

    fn render_frame(
        &mut self,
        surface: &mut Self::Surface,
        frame: &mut Self::Frame,
        draw_data: &DrawData,
        clear_color: [f32; 4],
    ) -> BackendResult<()>;

    fn present_frame(
        &mut self,
        surface: &mut Self::Surface,
        frame: Self::Frame,
    ) -> BackendResult<PresentStatus>;

    /// Block until all submitted device work has finished.
    fn wait_idle(&mut self) -> BackendResult<()>;
}

/// Factory for windows and devices.
///
/// One platform is owned by each engine and only used while holding the
/// engine's lifecycle lock.
pub trait Platform: Send + 'static {
    type Window: PlatformWindow;
    type Device: FrameDevice<Window = Self::Window>;

    fn create_window(&mut self, title: &str, width: u32, height: u32)
        -> BackendResult<Self::Window>;

    fn destroy_window(&mut self, window: Self::Window);

    /// Whether the graphics API needed by [`create_device`](Self::create_device) is available.
    fn query_support(&self, window: &Self::Window) -> bool;

    fn create_device(&mut self, window: &Self::Window) -> BackendResult<Self::Device>;

    fn release_device(&mut self, device: Self::Device);
}
