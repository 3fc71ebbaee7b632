//! wgpu backend implementation
//!
//! [`WgpuPlatform`] opens winit windows and wgpu devices. Each surface is
//! configured for FIFO presentation and draws egui output through
//! [`WgpuEguiRenderer`].

use std::sync::Arc;

use crate::backend::traits::*;
use crate::egui_integration::{DrawData, WgpuEguiRenderer};
use crate::window::{WinitEventLoop, WinitWindow};

/// Backends to try, honoring the `WGPU_BACKEND` environment variable.
fn preferred_backends() -> wgpu::Backends {
    if let Some(backends) = wgpu::util::backend_bits_from_env() {
        return backends;
    }
    // On Windows, prefer Vulkan to avoid D3D12 debug layer validation errors
    #[cfg(target_os = "windows")]
    {
        wgpu::Backends::VULKAN | wgpu::Backends::DX12
    }
    #[cfg(not(target_os = "windows"))]
    {
        wgpu::Backends::all()
    }
}

/// Window and device factory for the wgpu backend
pub struct WgpuPlatform {
    instance: Arc<wgpu::Instance>,
    backends: wgpu::Backends,
    /// Held between windows; winit allows only one per process
    event_loop: Option<WinitEventLoop>,
}

impl WgpuPlatform {
    pub fn new() -> Self {
        let backends = preferred_backends();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        Self {
            instance: Arc::new(instance),
            backends,
            event_loop: None,
        }
    }
}

impl Default for WgpuPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for WgpuPlatform {
    type Window = WinitWindow;
    type Device = WgpuDevice;

    fn create_window(&mut self, title: &str, width: u32, height: u32) -> BackendResult<WinitWindow> {
        let event_loop = match self.event_loop.take() {
            Some(event_loop) => event_loop,
            None => WinitEventLoop::new()
                .map_err(|e| BackendError::WindowCreationFailed(e.to_string()))?,
        };

        WinitWindow::new(event_loop, title, width, height).map_err(|(event_loop, err)| {
            self.event_loop = Some(event_loop);
            err
        })
    }

    fn destroy_window(&mut self, window: WinitWindow) {
        self.event_loop = Some(window.into_event_loop());
    }

    fn query_support(&self, _window: &WinitWindow) -> bool {
        !self.instance.enumerate_adapters(self.backends).is_empty()
    }

    fn create_device(&mut self, _window: &WinitWindow) -> BackendResult<WgpuDevice> {
        let adapter = pollster::block_on(self.instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .ok_or_else(|| BackendError::DeviceCreationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Plot Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(WgpuDevice {
            instance: Arc::clone(&self.instance),
            adapter,
            device,
            queue,
        })
    }

    fn release_device(&mut self, device: WgpuDevice) {
        drop(device);
    }
}

/// Logical device and queue
pub struct WgpuDevice {
    instance: Arc<wgpu::Instance>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

/// Presentable surface plus the resources built for its current size
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
    renderer: Option<WgpuEguiRenderer>,
}

pub struct WgpuFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl WgpuDevice {
    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_extent(&self, extent: Extent) -> Extent {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if extent.width > max_size || extent.height > max_size {
            let scale = (max_size as f32 / extent.width as f32)
                .min(max_size as f32 / extent.height as f32);
            Extent::new(
                ((extent.width as f32 * scale) as u32).max(1),
                ((extent.height as f32 * scale) as u32).max(1),
            )
        } else {
            Extent::new(extent.width.max(1), extent.height.max(1))
        }
    }

    /// egui blends in gamma space, so prefer a non-sRGB target.
    fn pick_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
        formats
            .iter()
            .copied()
            .find(|f| {
                matches!(
                    f,
                    wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Rgba8Unorm
                )
            })
            .or_else(|| formats.iter().copied().find(|f| !f.is_srgb()))
            .or_else(|| formats.first().copied())
    }
}

impl FrameDevice for WgpuDevice {
    type Window = WinitWindow;
    type Surface = WgpuSurface;
    type Frame = WgpuFrame;

    fn create_surface(&mut self, window: &WinitWindow) -> BackendResult<WgpuSurface> {
        let surface = self
            .instance
            .create_surface(window.window_arc())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        if !self.adapter.is_surface_supported(&surface) {
            return Err(BackendError::Unsupported(
                "adapter cannot present to this window".into(),
            ));
        }

        Ok(WgpuSurface {
            surface,
            config: None,
            renderer: None,
        })
    }

    fn destroy_surface(&mut self, surface: WgpuSurface) {
        drop(surface);
    }

    fn setup_surface_resources(
        &mut self,
        surface: &mut WgpuSurface,
        extent: Extent,
        min_image_count: u32,
    ) -> BackendResult<()> {
        let caps = surface.surface.get_capabilities(&self.adapter);
        let format = Self::pick_format(&caps.formats).ok_or_else(|| {
            BackendError::SurfaceSetupFailed("surface reports no formats".into())
        })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let size = self.clamp_extent(extent);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: min_image_count,
        };
        surface.surface.configure(&self.device, &config);
        log::debug!(
            "Configured surface {}x{} ({:?})",
            size.width,
            size.height,
            format
        );

        let keep_renderer = surface
            .renderer
            .as_ref()
            .is_some_and(|renderer| renderer.format() == format);
        if !keep_renderer {
            surface.renderer = Some(WgpuEguiRenderer::new(&self.device, format));
        }
        surface.config = Some(config);
        Ok(())
    }

    fn teardown_surface_resources(&mut self, surface: &mut WgpuSurface) {
        surface.renderer = None;
        surface.config = None;
    }

    fn resize_surface_resources(
        &mut self,
        surface: &mut WgpuSurface,
        extent: Extent,
        min_image_count: u32,
    ) -> BackendResult<()> {
        // Reconfiguring in place keeps the egui pipeline when the format is unchanged
        self.setup_surface_resources(surface, extent, min_image_count)
    }

    fn acquire_frame(&mut self, surface: &mut WgpuSurface) -> BackendResult<Acquire<WgpuFrame>> {
        if surface.config.is_none() {
            return Err(BackendError::Other(
                "surface resources are not set up".into(),
            ));
        }

        let texture = match surface.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(err) => {
                log::debug!("Surface texture unavailable: {}", err);
                return Ok(Acquire::Outdated);
            }
        };

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let suboptimal = texture.suboptimal;
        let frame = WgpuFrame { texture, view };
        Ok(if suboptimal {
            Acquire::Suboptimal(frame)
        } else {
            Acquire::Ready(frame)
        })
    }

    fn render_frame(
        &mut self,
        surface: &mut WgpuSurface,
        frame: &mut WgpuFrame,
        draw_data: &DrawData,
        clear_color: [f32; 4],
    ) -> BackendResult<()> {
        let renderer = surface.renderer.as_mut().ok_or_else(|| {
            BackendError::Other("surface resources are not set up".into())
        })?;
        renderer.render(&self.device, &self.queue, &frame.view, draw_data, clear_color);
        Ok(())
    }

    fn present_frame(
        &mut self,
        _surface: &mut WgpuSurface,
        frame: WgpuFrame,
    ) -> BackendResult<PresentStatus> {
        let WgpuFrame { texture, view } = frame;
        drop(view);
        texture.present();
        Ok(PresentStatus::Presented)
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
