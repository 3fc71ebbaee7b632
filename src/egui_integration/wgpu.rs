//! wgpu egui integration
//!
//! Provides egui rendering support for the wgpu backend.

use egui_wgpu::ScreenDescriptor;

use super::DrawData;

/// egui-wgpu renderer bound to one surface format
pub struct WgpuEguiRenderer {
    renderer: egui_wgpu::Renderer,
    format: wgpu::TextureFormat,
}

impl WgpuEguiRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let renderer = egui_wgpu::Renderer::new(device, format, None, 1);
        Self { renderer, format }
    }

    /// Surface format the pipeline was built for
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Clear `view` and draw one tessellated egui frame into it
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        view: &wgpu::TextureView,
        draw_data: &DrawData,
        clear_color: [f32; 4],
    ) {
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [draw_data.size_in_pixels.width, draw_data.size_in_pixels.height],
            pixels_per_point: draw_data.pixels_per_point,
        };

        for (id, image_delta) in &draw_data.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui Encoder"),
        });
        let callback_buffers = self.renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &draw_data.paint_jobs,
            &screen_descriptor,
        );

        {
            let [r, g, b, a] = clear_color.map(f64::from);
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .render(&mut render_pass, &draw_data.paint_jobs, &screen_descriptor);
        }

        queue.submit(
            callback_buffers
                .into_iter()
                .chain(std::iter::once(encoder.finish())),
        );

        for id in &draw_data.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}
