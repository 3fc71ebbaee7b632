//! Surface lifecycle: window, device, presentable surface and UI context.
//!
//! The whole set is created together by [`Lifecycle::init`] and released
//! together by [`Lifecycle::deinit`]. A running frame loop checks the
//! surface out of its slot and returns it when it exits, so the lifecycle
//! lock is not held while frames are produced.

use crate::backend::traits::{BackendError, Extent, FrameDevice, Platform, PlatformWindow};
use crate::egui_integration::UiContext;
use crate::error::{EngineError, EngineResult};
use crate::rollback::Rollback;
use crate::EngineConfig;

type TargetOf<P> = <<P as Platform>::Device as FrameDevice>::Surface;

/// Everything needed to produce frames for one window.
pub(crate) struct Surface<P: Platform> {
    pub window: P::Window,
    pub device: P::Device,
    pub target: TargetOf<P>,
    pub ui: UiContext,
    /// Extent the surface resources were last built for
    pub extent: Extent,
    /// Set when the surface resources must be rebuilt before the next frame
    pub needs_rebuild: bool,
}

enum SurfaceSlot<P: Platform> {
    Absent,
    Ready(Box<Surface<P>>),
    /// Checked out by a running frame loop
    InUse,
}

/// Platform, title and surface slot, guarded together by the engine.
pub(crate) struct Lifecycle<P: Platform> {
    platform: P,
    title: String,
    slot: SurfaceSlot<P>,
}

impl<P: Platform> Lifecycle<P> {
    pub fn new(platform: P, title: impl Into<String>) -> Self {
        Self {
            platform,
            title: title.into(),
            slot: SurfaceSlot::Absent,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Store `title` and apply it to the live window, if there is one.
    ///
    /// A checked-out window keeps its title until the next init.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        if let SurfaceSlot::Ready(surface) = &mut self.slot {
            surface.window.set_title(title);
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.slot, SurfaceSlot::Absent)
    }

    /// Create the surface unless one exists. `title` is only used when
    /// something is actually created.
    pub fn init(&mut self, title: Option<&str>, config: &EngineConfig) -> EngineResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if let Some(title) = title {
            self.title = title.to_string();
        }

        let surface = build_surface(&mut self.platform, &self.title, config)?;
        log::info!(
            "Surface initialized: \"{}\" ({}x{})",
            self.title,
            surface.extent.width,
            surface.extent.height
        );
        self.slot = SurfaceSlot::Ready(Box::new(surface));
        Ok(())
    }

    /// Release the surface. No-op when nothing is initialized.
    ///
    /// Fails with [`EngineError::SurfaceBusy`] while a frame loop has the
    /// surface checked out; that loop releases it when it exits.
    pub fn deinit(&mut self) -> EngineResult<()> {
        match std::mem::replace(&mut self.slot, SurfaceSlot::Absent) {
            SurfaceSlot::Absent => Ok(()),
            SurfaceSlot::InUse => {
                self.slot = SurfaceSlot::InUse;
                Err(EngineError::SurfaceBusy)
            }
            SurfaceSlot::Ready(surface) => {
                let result = teardown(&mut self.platform, *surface);
                log::info!("Surface released");
                result
            }
        }
    }

    /// Hand the surface to a frame loop, creating it first if needed.
    ///
    /// The loop must run on a thread the window accepts; otherwise the
    /// surface stays in place and [`EngineError::WindowUnavailable`] is
    /// returned.
    pub fn check_out(&mut self, config: &EngineConfig) -> EngineResult<Box<Surface<P>>> {
        self.init(None, config)?;
        match std::mem::replace(&mut self.slot, SurfaceSlot::InUse) {
            SurfaceSlot::Ready(surface) => {
                if let Err(err) = surface.window.check_thread() {
                    log::warn!("Frame loop cannot drive the window from this thread: {}", err);
                    self.slot = SurfaceSlot::Ready(surface);
                    return Err(EngineError::WindowUnavailable(err));
                }
                Ok(surface)
            }
            other => {
                self.slot = other;
                Err(EngineError::AlreadyRunning)
            }
        }
    }

    /// Return a surface taken by [`check_out`](Self::check_out).
    pub fn check_in(&mut self, surface: Box<Surface<P>>) {
        self.slot = SurfaceSlot::Ready(surface);
    }

    #[cfg(test)]
    pub fn platform(&self) -> &P {
        &self.platform
    }
}

/// Resources acquired so far during init.
struct Parts<'p, P: Platform> {
    platform: &'p mut P,
    window: Option<P::Window>,
    device: Option<P::Device>,
    target: Option<TargetOf<P>>,
}

fn build_surface<P: Platform>(
    platform: &mut P,
    title: &str,
    config: &EngineConfig,
) -> EngineResult<Surface<P>> {
    let mut parts = Parts {
        platform,
        window: None,
        device: None,
        target: None,
    };
    let mut undo = Rollback::new();

    let extent = match acquire(&mut parts, &mut undo, title, config) {
        Ok(extent) => extent,
        Err(err) => {
            log::warn!(
                "Surface initialization failed, releasing {} step(s): {}",
                undo.len(),
                err
            );
            undo.unwind(&mut parts);
            return Err(err);
        }
    };
    undo.commit();

    let Parts {
        window: Some(mut window),
        device: Some(device),
        target: Some(target),
        ..
    } = parts
    else {
        return Err(EngineError::Initialization(BackendError::Other(
            "surface initialization left resources missing".to_string(),
        )));
    };

    let ui = UiContext::new(&mut window, config.dark_theme);
    Ok(Surface {
        window,
        device,
        target,
        ui,
        extent,
        needs_rebuild: false,
    })
}

/// Acquire window, device, surface and surface resources, recording how to
/// release each one. Returns the extent the resources were built for.
fn acquire<'p, P: Platform>(
    parts: &mut Parts<'p, P>,
    undo: &mut Rollback<'_, Parts<'p, P>>,
    title: &str,
    config: &EngineConfig,
) -> EngineResult<Extent> {
    let window = parts
        .platform
        .create_window(title, config.width, config.height)
        .map_err(EngineError::WindowUnavailable)?;
    let window = parts.window.insert(window);
    undo.push(|parts: &mut Parts<'p, P>| {
        if let Some(window) = parts.window.take() {
            parts.platform.destroy_window(window);
        }
    });

    if !parts.platform.query_support(window) {
        return Err(EngineError::ApiNotSupported);
    }

    let device = parts
        .platform
        .create_device(window)
        .map_err(EngineError::Initialization)?;
    let device = parts.device.insert(device);
    undo.push(|parts: &mut Parts<'p, P>| {
        if let Some(device) = parts.device.take() {
            parts.platform.release_device(device);
        }
    });

    let target = device
        .create_surface(window)
        .map_err(EngineError::Initialization)?;
    let target = parts.target.insert(target);
    undo.push(|parts: &mut Parts<'p, P>| {
        if let (Some(device), Some(target)) = (parts.device.as_mut(), parts.target.take()) {
            device.destroy_surface(target);
        }
    });

    let extent = window.framebuffer_size();
    device
        .setup_surface_resources(target, extent, config.min_image_count)
        .map_err(EngineError::Initialization)?;

    Ok(extent)
}

/// Release everything in a surface.
///
/// Every step runs even if the device fails to go idle; that failure is
/// reported afterwards.
fn teardown<P: Platform>(platform: &mut P, surface: Surface<P>) -> EngineResult<()> {
    let Surface {
        mut window,
        mut device,
        mut target,
        ui,
        ..
    } = surface;

    let idle = device.wait_idle();
    if let Err(err) = &idle {
        log::warn!("Device did not go idle before teardown: {}", err);
    }

    ui.destroy(&mut window);
    device.teardown_surface_resources(&mut target);
    device.destroy_surface(target);
    platform.destroy_window(window);
    platform.release_device(device);

    idle.map_err(EngineError::Device)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyCall, DummyPlatform, FailurePoint};

    fn lifecycle() -> Lifecycle<DummyPlatform> {
        Lifecycle::new(DummyPlatform::new(), "test")
    }

    #[test]
    fn init_twice_creates_once() {
        let mut lifecycle = lifecycle();
        let config = EngineConfig::default();
        let control = lifecycle.platform().control();

        lifecycle.init(None, &config).unwrap();
        lifecycle.init(Some("ignored"), &config).unwrap();

        assert!(lifecycle.is_initialized());
        assert_eq!(lifecycle.title(), "test");
        assert_eq!(control.count(&DummyCall::CreateDevice), 1);
    }

    #[test]
    fn init_uses_config_size_and_framebuffer_extent() {
        let mut lifecycle = lifecycle();
        let control = lifecycle.platform().control();
        control.set_framebuffer_size(Extent::new(300, 200));
        let config = EngineConfig::default().with_size(640, 480);

        lifecycle.init(Some("sized"), &config).unwrap();

        let calls = control.calls();
        assert_eq!(
            calls[0],
            DummyCall::CreateWindow {
                title: "sized".to_string(),
                width: 640,
                height: 480
            }
        );
        assert!(calls.contains(&DummyCall::SetupSurfaceResources(Extent::new(300, 200))));
    }

    #[test]
    fn deinit_releases_in_order() {
        let mut lifecycle = lifecycle();
        let control = lifecycle.platform().control();
        lifecycle.init(None, &EngineConfig::default()).unwrap();
        control.clear_calls();

        lifecycle.deinit().unwrap();
        lifecycle.deinit().unwrap();

        assert!(!lifecycle.is_initialized());
        assert_eq!(
            control.calls(),
            vec![
                DummyCall::WaitIdle,
                DummyCall::TeardownSurfaceResources,
                DummyCall::DestroySurface,
                DummyCall::DestroyWindow,
                DummyCall::ReleaseDevice,
            ]
        );
    }

    #[test]
    fn teardown_completes_when_device_fails_to_idle() {
        let mut lifecycle = lifecycle();
        let control = lifecycle.platform().control();
        lifecycle.init(None, &EngineConfig::default()).unwrap();
        control.fail_at(Some(FailurePoint::WaitIdle));

        let err = lifecycle.deinit().unwrap_err();
        assert!(matches!(err, EngineError::Device(BackendError::DeviceLost)));
        assert!(!lifecycle.is_initialized());
        assert_eq!(control.count(&DummyCall::ReleaseDevice), 1);
        assert_eq!(control.count(&DummyCall::DestroyWindow), 1);
    }

    #[test]
    fn checked_out_surface_is_busy() {
        let mut lifecycle = lifecycle();
        let config = EngineConfig::default();
        let surface = lifecycle.check_out(&config).unwrap();

        assert!(lifecycle.is_initialized());
        assert!(matches!(lifecycle.deinit(), Err(EngineError::SurfaceBusy)));
        assert!(matches!(
            lifecycle.check_out(&config),
            Err(EngineError::AlreadyRunning)
        ));

        lifecycle.check_in(surface);
        lifecycle.deinit().unwrap();
        assert!(!lifecycle.is_initialized());
    }

    #[test]
    fn set_title_updates_live_window() {
        let mut lifecycle = lifecycle();
        let control = lifecycle.platform().control();

        lifecycle.set_title("before init");
        assert_eq!(control.count_where(|c| matches!(c, DummyCall::SetTitle(_))), 0);

        lifecycle.init(None, &EngineConfig::default()).unwrap();
        lifecycle.set_title("live");
        assert_eq!(control.count(&DummyCall::SetTitle("live".to_string())), 1);
        assert_eq!(lifecycle.title(), "live");
    }
}
