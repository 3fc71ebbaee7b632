//! The frame loop body.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crate::backend::traits::{Acquire, FrameDevice, Platform, PlatformWindow, PresentStatus};
use crate::controller::StopToken;
use crate::error::{panic_message, EngineError, EngineResult};
use crate::lifecycle::Surface;
use crate::registry::DrawerRegistry;
use crate::EngineConfig;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    StopRequested,
    WindowClosed,
}

/// Why an iteration produced no presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Skip {
    /// Window minimized or zero-sized
    Idle,
    /// Widget output had no drawable area
    Degenerate,
    /// Surface out of date; rebuilt next iteration
    Outdated,
    /// Rendered into a suboptimal image that was not presented
    Suboptimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Presented,
    Skipped(Skip),
    Exit(Exit),
}

/// Drives one checked-out surface until stopped or closed.
pub(crate) struct FrameLoop<'a, P: Platform> {
    pub surface: &'a mut Surface<P>,
    pub drawers: &'a DrawerRegistry,
    pub config: &'a EngineConfig,
    pub token: &'a StopToken,
    /// Rebuild requests from outside the loop
    pub rebuild_requested: &'a AtomicBool,
    pub frames: &'a AtomicU64,
}

impl<P: Platform> FrameLoop<'_, P> {
    /// Run iterations until the token is cancelled or the window closes.
    pub fn run(&mut self) -> EngineResult<Exit> {
        loop {
            if let Step::Exit(exit) = self.step()? {
                return Ok(exit);
            }
        }
    }

    /// Run one iteration.
    pub fn step(&mut self) -> EngineResult<Step> {
        if self.token.is_cancelled() {
            return Ok(Step::Exit(Exit::StopRequested));
        }

        let surface = &mut *self.surface;
        if surface.window.should_close() {
            return Ok(Step::Exit(Exit::WindowClosed));
        }
        surface.window.poll_events();

        let size = surface.window.framebuffer_size();
        if self.rebuild_requested.swap(false, Ordering::AcqRel) {
            surface.needs_rebuild = true;
        }
        if size.is_presentable() && (surface.needs_rebuild || size != surface.extent) {
            log::debug!(
                "Rebuilding surface resources: {}x{} -> {}x{}",
                surface.extent.width,
                surface.extent.height,
                size.width,
                size.height
            );
            surface
                .device
                .resize_surface_resources(&mut surface.target, size, self.config.min_image_count)
                .map_err(EngineError::Device)?;
            surface.extent = size;
            surface.needs_rebuild = false;
        }

        if !size.is_presentable() || surface.window.is_iconified() {
            thread::sleep(self.config.idle_sleep);
            return Ok(Step::Skipped(Skip::Idle));
        }

        surface.ui.begin_frame(&mut surface.window);
        let snapshot = self.drawers.snapshot();
        let ctx = surface.ui.context();
        panic::catch_unwind(AssertUnwindSafe(|| {
            for entry in snapshot.iter() {
                entry.invoke(ctx);
            }
        }))
        .map_err(|payload| EngineError::DrawerPanicked(panic_message(payload.as_ref())))?;
        let draw_data = surface.ui.end_frame(&mut surface.window, surface.extent);

        if draw_data.is_degenerate() {
            return Ok(Step::Skipped(Skip::Degenerate));
        }

        let acquired = surface
            .device
            .acquire_frame(&mut surface.target)
            .map_err(EngineError::Device)?;
        let (mut frame, suboptimal) = match acquired {
            Acquire::Ready(frame) => (frame, false),
            Acquire::Suboptimal(frame) => {
                surface.needs_rebuild = true;
                (frame, true)
            }
            Acquire::Outdated => {
                log::debug!("Surface out of date on acquire");
                surface.needs_rebuild = true;
                return Ok(Step::Skipped(Skip::Outdated));
            }
        };

        surface
            .device
            .render_frame(
                &mut surface.target,
                &mut frame,
                &draw_data,
                premultiplied(self.config.clear_color),
            )
            .map_err(EngineError::Device)?;

        if suboptimal {
            return Ok(Step::Skipped(Skip::Suboptimal));
        }

        let status = surface
            .device
            .present_frame(&mut surface.target, frame)
            .map_err(EngineError::Device)?;
        match status {
            PresentStatus::Presented => {}
            PresentStatus::Suboptimal => {
                surface.needs_rebuild = true;
            }
            PresentStatus::Outdated => {
                log::warn!("Surface out of date on present");
                surface.needs_rebuild = true;
                return Ok(Step::Skipped(Skip::Outdated));
            }
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(Step::Presented)
    }
}

fn premultiplied([r, g, b, a]: [f32; 4]) -> [f32; 4] {
    [r * a, g * a, b * a, a]
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyCall, DummyControl, DummyPlatform, FailurePoint};
    use crate::backend::traits::{BackendError, Extent};
    use crate::lifecycle::Lifecycle;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Harness {
        lifecycle: Lifecycle<DummyPlatform>,
        control: Arc<DummyControl>,
        surface: Option<Box<Surface<DummyPlatform>>>,
        drawers: DrawerRegistry,
        config: EngineConfig,
        token: StopToken,
        rebuild: AtomicBool,
        frames: AtomicU64,
    }

    impl Harness {
        fn new() -> Self {
            let platform = DummyPlatform::new();
            let control = platform.control();
            control.set_frame_interval(Duration::ZERO);
            let config = EngineConfig::default().with_idle_sleep(Duration::from_millis(1));
            let mut lifecycle = Lifecycle::new(platform, "frames");
            let surface = lifecycle.check_out(&config).unwrap();
            Self {
                lifecycle,
                control,
                surface: Some(surface),
                drawers: DrawerRegistry::new(),
                config,
                token: StopToken::new(),
                rebuild: AtomicBool::new(false),
                frames: AtomicU64::new(0),
            }
        }

        fn step(&mut self) -> EngineResult<Step> {
            let surface: &mut Surface<DummyPlatform> = self.surface.as_mut().unwrap();
            FrameLoop {
                surface,
                drawers: &self.drawers,
                config: &self.config,
                token: &self.token,
                rebuild_requested: &self.rebuild,
                frames: &self.frames,
            }
            .step()
        }

        fn finish(mut self) {
            self.lifecycle.check_in(self.surface.take().unwrap());
            self.lifecycle.deinit().unwrap();
        }
    }

    #[test]
    fn presents_and_counts_frames() {
        let mut harness = Harness::new();
        for _ in 0..3 {
            assert_eq!(harness.step().unwrap(), Step::Presented);
        }
        assert_eq!(harness.frames.load(Ordering::Relaxed), 3);
        assert_eq!(harness.control.count(&DummyCall::PresentFrame), 3);
        assert!(harness.control.resizes().is_empty());
        harness.finish();
    }

    #[test]
    fn drawers_run_in_registration_order() {
        let mut harness = Harness::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            harness.drawers.register(name, move |ctx| {
                order.lock().unwrap().push(name);
                ctx.layer_painter(egui::LayerId::background()).rect_filled(
                    egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(10.0, 10.0)),
                    0.0,
                    egui::Color32::RED,
                );
            });
        }

        harness.step().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(
            harness.control.count_where(
                |c| matches!(c, DummyCall::RenderFrame { primitives } if *primitives > 0)
            ),
            1
        );
        harness.finish();
    }

    #[test]
    fn stop_token_exits_before_polling() {
        let mut harness = Harness::new();
        harness.token.cancel();
        assert_eq!(harness.step().unwrap(), Step::Exit(Exit::StopRequested));
        assert_eq!(harness.control.polls(), 0);
        harness.finish();
    }

    #[test]
    fn closed_window_exits() {
        let mut harness = Harness::new();
        harness.control.request_close();
        assert_eq!(harness.step().unwrap(), Step::Exit(Exit::WindowClosed));
        harness.finish();
    }

    #[test]
    fn resize_rebuilds_once() {
        let mut harness = Harness::new();
        harness.control.set_framebuffer_size(Extent::new(1024, 512));
        for _ in 0..4 {
            harness.step().unwrap();
        }
        assert_eq!(harness.control.resizes(), vec![Extent::new(1024, 512)]);
        assert_eq!(
            harness.surface.as_ref().unwrap().extent,
            Extent::new(1024, 512)
        );
        harness.finish();
    }

    #[test]
    fn zero_size_and_iconified_idle() {
        let mut harness = Harness::new();
        let invoked = Arc::new(AtomicUsize::new(0));
        {
            let invoked = Arc::clone(&invoked);
            harness.drawers.register("hidden", move |_| {
                invoked.fetch_add(1, Ordering::Relaxed);
            });
        }
        harness.control.set_framebuffer_size(Extent::new(0, 600));
        assert_eq!(harness.step().unwrap(), Step::Skipped(Skip::Idle));

        harness.control.set_framebuffer_size(Extent::new(800, 600));
        harness.control.set_iconified(true);
        assert_eq!(harness.step().unwrap(), Step::Skipped(Skip::Idle));

        assert!(harness.control.resizes().is_empty());
        assert_eq!(harness.control.count(&DummyCall::AcquireFrame), 0);
        // idle iterations skip the UI frame entirely
        assert_eq!(invoked.load(Ordering::Relaxed), 0);

        harness.control.set_iconified(false);
        assert_eq!(harness.step().unwrap(), Step::Presented);
        assert_eq!(invoked.load(Ordering::Relaxed), 1);
        harness.finish();
    }

    #[test]
    fn outdated_acquire_rebuilds_on_next_iteration() {
        let mut harness = Harness::new();
        harness.control.push_acquire(Ok(Acquire::Outdated));

        assert_eq!(harness.step().unwrap(), Step::Skipped(Skip::Outdated));
        assert!(harness.surface.as_ref().unwrap().needs_rebuild);

        assert_eq!(harness.step().unwrap(), Step::Presented);
        assert_eq!(harness.control.resizes(), vec![Extent::new(800, 600)]);
        harness.finish();
    }

    #[test]
    fn suboptimal_acquire_renders_without_presenting() {
        let mut harness = Harness::new();
        harness.control.push_acquire(Ok(Acquire::Suboptimal(())));

        assert_eq!(harness.step().unwrap(), Step::Skipped(Skip::Suboptimal));
        assert_eq!(
            harness
                .control
                .count_where(|c| matches!(c, DummyCall::RenderFrame { .. })),
            1
        );
        assert_eq!(harness.control.count(&DummyCall::PresentFrame), 0);
        assert!(harness.surface.as_ref().unwrap().needs_rebuild);
        harness.finish();
    }

    #[test]
    fn external_rebuild_request_is_folded_in() {
        let mut harness = Harness::new();
        harness.rebuild.store(true, Ordering::Release);
        harness.step().unwrap();
        harness.step().unwrap();
        assert_eq!(harness.control.resizes(), vec![Extent::new(800, 600)]);
        harness.finish();
    }

    #[test]
    fn device_errors_are_fatal() {
        let mut harness = Harness::new();
        harness.control.push_acquire(Err(BackendError::OutOfMemory));
        assert!(matches!(
            harness.step(),
            Err(EngineError::Device(BackendError::OutOfMemory))
        ));

        harness.control.fail_at(Some(FailurePoint::ResizeSurfaceResources));
        harness.control.set_framebuffer_size(Extent::new(10, 10));
        assert!(matches!(
            harness.step(),
            Err(EngineError::Device(BackendError::DeviceLost))
        ));
        harness.control.fail_at(None);
        harness.finish();
    }

    #[test]
    fn drawer_panic_is_reported() {
        let mut harness = Harness::new();
        harness.drawers.register("bad", |_| panic!("bad drawer"));
        match harness.step() {
            Err(EngineError::DrawerPanicked(msg)) => assert_eq!(msg, "bad drawer"),
            other => panic!("unexpected step: {other:?}"),
        }
        harness.finish();
    }

    #[test]
    fn clear_color_is_premultiplied() {
        assert_eq!(premultiplied([1.0, 0.5, 0.25, 0.5]), [0.5, 0.25, 0.125, 0.5]);
    }
}
