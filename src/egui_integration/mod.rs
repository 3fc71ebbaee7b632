//! egui GUI integration
//!
//! [`UiContext`] is the widget-library context bound to the engine's
//! surface. Each frame it turns window input into an egui frame, lets the
//! registered drawers build widgets, and tessellates the result into
//! [`DrawData`] for the frame device.

#[cfg(feature = "native")]
mod wgpu;

#[cfg(feature = "native")]
pub use self::wgpu::WgpuEguiRenderer;

use crate::backend::traits::{Extent, PlatformWindow};

/// Tessellated output of one widget frame.
#[derive(Debug)]
pub struct DrawData {
    /// Clipped meshes ready for the renderer
    pub paint_jobs: Vec<egui::ClippedPrimitive>,
    /// Font atlas and image uploads/frees for this frame
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    /// Framebuffer size the frame was laid out for
    pub size_in_pixels: Extent,
    /// Screen rectangle in points, as egui saw it
    pub screen_rect: egui::Rect,
}

impl DrawData {
    /// Whether the draw area has zero width or height.
    pub fn is_degenerate(&self) -> bool {
        !self.size_in_pixels.is_presentable()
            || self.screen_rect.width() <= 0.0
            || self.screen_rect.height() <= 0.0
    }
}

/// Widget-library context for one surface.
pub struct UiContext {
    ctx: egui::Context,
}

impl UiContext {
    /// Create a context and bind it to `window`'s input.
    pub fn new<W: PlatformWindow>(window: &mut W, dark_theme: bool) -> Self {
        let ctx = egui::Context::default();
        ctx.set_visuals(if dark_theme {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });
        window.attach_ui(&ctx);
        Self { ctx }
    }

    /// Get the egui context
    pub fn context(&self) -> &egui::Context {
        &self.ctx
    }

    /// Begin a new egui frame
    pub fn begin_frame<W: PlatformWindow>(&mut self, window: &mut W) {
        let raw_input = window.take_ui_input();
        self.ctx.begin_frame(raw_input);
    }

    /// End the egui frame and tessellate it
    pub fn end_frame<W: PlatformWindow>(&mut self, window: &mut W, extent: Extent) -> DrawData {
        let full_output = self.ctx.end_frame();

        window.handle_ui_output(full_output.platform_output);

        let paint_jobs = self
            .ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        DrawData {
            paint_jobs,
            textures_delta: full_output.textures_delta,
            pixels_per_point: full_output.pixels_per_point,
            size_in_pixels: extent,
            screen_rect: self.ctx.screen_rect(),
        }
    }

    /// Unbind from the window. The egui context is dropped with `self`.
    pub fn destroy<W: PlatformWindow>(self, window: &mut W) {
        window.detach_ui();
    }
}
