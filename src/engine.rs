//! Plot engine - the public facade over drawers, surface and frame loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::backend::traits::Platform;
use crate::controller::{ExecutionContext, LoopController, LoopState};
use crate::error::{panic_message, EngineError, EngineResult};
use crate::frame::FrameLoop;
use crate::lifecycle::Lifecycle;
use crate::registry::{DrawerId, DrawerRegistry, DrawerSnapshot};
use crate::EngineConfig;

/// Name of the thread started by [`PlotEngine::run_async`].
pub const LOOP_THREAD_NAME: &str = "plot-engine-loop";

/// Run-loop manager for an immediate-mode plotting surface.
///
/// Drawers can be registered and removed from any thread at any time. The
/// surface is created lazily by the first loop run (or explicitly by
/// [`init`](Self::init)) and released when a loop exits.
///
/// Share the engine as `Arc<PlotEngine<P>>`; [`run_async`](Self::run_async)
/// needs an `Arc` to hand to the loop thread.
pub struct PlotEngine<P: Platform> {
    config: EngineConfig,
    drawers: DrawerRegistry,
    /// Platform, title and surface slot. Also held while the registry is
    /// cleared at loop exit.
    lifecycle: Mutex<Lifecycle<P>>,
    controller: LoopController,
    rebuild_requested: AtomicBool,
    frames: AtomicU64,
}

impl<P: Platform> PlotEngine<P> {
    /// Create an engine. Nothing is opened until the surface is initialized.
    pub fn new(platform: P, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let lifecycle = Lifecycle::new(platform, config.title.clone());
        Ok(Self {
            config,
            drawers: DrawerRegistry::new(),
            lifecycle: Mutex::new(lifecycle),
            controller: LoopController::new(),
            rebuild_requested: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Drawers

    /// Register a named drawer, invoked every frame in registration order.
    pub fn register<F>(&self, key: impl Into<String>, callback: F) -> DrawerId
    where
        F: Fn(&egui::Context) + Send + Sync + 'static,
    {
        self.drawers.register(key, callback)
    }

    /// Register an unnamed drawer.
    pub fn draw<F>(&self, callback: F) -> DrawerId
    where
        F: Fn(&egui::Context) + Send + Sync + 'static,
    {
        self.drawers.register(String::new(), callback)
    }

    pub fn unregister(&self, id: DrawerId) -> bool {
        self.drawers.unregister(id)
    }

    pub fn unregister_key(&self, key: &str) -> usize {
        self.drawers.unregister_key(key)
    }

    pub fn unregister_all(&self) {
        self.drawers.clear();
    }

    /// Current drawers, as the next frame will see them.
    pub fn drawers(&self) -> DrawerSnapshot {
        self.drawers.snapshot()
    }

    // Surface

    /// Create window, device and surface if they don't exist yet.
    ///
    /// `title` replaces the stored title only when something is created.
    /// On failure everything acquired so far is released again.
    pub fn init(&self, title: Option<&str>) -> EngineResult<()> {
        self.lifecycle.lock().init(title, &self.config)
    }

    /// Release the surface. No-op if it isn't initialized.
    ///
    /// Fails with [`EngineError::SurfaceBusy`] while a loop is running on it.
    pub fn deinit(&self) -> EngineResult<()> {
        self.lifecycle.lock().deinit()
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.lock().is_initialized()
    }

    /// Ask the running loop to rebuild its surface resources before the next frame.
    pub fn request_rebuild(&self) {
        self.rebuild_requested.store(true, Ordering::Release);
    }

    pub fn title(&self) -> String {
        self.lifecycle.lock().title().to_string()
    }

    // Frame loop

    /// Run the frame loop on the calling thread until the window closes or
    /// [`request_stop`](Self::request_stop) is called.
    ///
    /// The surface is initialized on entry if needed and released on exit,
    /// after which the drawers are cleared when `clear_entries_on_exit` is set.
    pub fn run(&self, title: Option<&str>, clear_entries_on_exit: bool) -> EngineResult<()> {
        let context = self.controller.attach_inline()?;
        let result = self.drive(title, clear_entries_on_exit, &context);
        context.finish();
        self.controller.release(&context);
        result
    }

    /// Start the frame loop on a background thread and return immediately.
    ///
    /// The loop clears the drawers when it exits. Its result is returned by
    /// [`wait`](Self::wait).
    pub fn run_async(self: &Arc<Self>) -> EngineResult<()> {
        let engine = Arc::clone(self);
        self.controller.attach_spawned(move |context| {
            thread::Builder::new()
                .name(LOOP_THREAD_NAME.to_string())
                .spawn(move || {
                    let result = engine.drive(None, true, &context);
                    context.finish();
                    result
                })
        })?;
        log::debug!("Frame loop thread started");
        Ok(())
    }

    /// Signal the running loop to exit at its next iteration. Does not block.
    pub fn request_stop(&self) {
        self.controller.request_stop();
    }

    /// Block until the background loop exits and return its result.
    ///
    /// Returns immediately when no background loop is attached.
    pub fn wait(&self) -> EngineResult<()> {
        self.controller.wait()
    }

    /// Let the background loop run on without a join obligation.
    pub fn detach(&self) {
        self.controller.detach();
    }

    pub fn loop_state(&self) -> LoopState {
        self.controller.state()
    }

    /// Frames presented over the engine's lifetime.
    pub fn frames_presented(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn drive(
        &self,
        title: Option<&str>,
        clear_entries_on_exit: bool,
        context: &ExecutionContext,
    ) -> EngineResult<()> {
        let mut surface = {
            let mut lifecycle = self.lifecycle.lock();
            if let Some(title) = title {
                lifecycle.set_title(title);
            }
            lifecycle.check_out(&self.config)?
        };

        log::info!("Frame loop started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            FrameLoop {
                surface: &mut surface,
                drawers: &self.drawers,
                config: &self.config,
                token: context.token(),
                rebuild_requested: &self.rebuild_requested,
                frames: &self.frames,
            }
            .run()
        }));
        let outcome = match outcome {
            Ok(Ok(exit)) => {
                log::info!("Frame loop exited: {:?}", exit);
                Ok(())
            }
            Ok(Err(err)) => {
                log::error!("Frame loop failed: {}", err);
                Err(err)
            }
            Err(payload) => Err(EngineError::LoopPanicked(panic_message(payload.as_ref()))),
        };

        let teardown = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.check_in(surface);
            let teardown = lifecycle.deinit();
            if clear_entries_on_exit {
                self.drawers.clear();
            }
            teardown
        };

        outcome.and(teardown)
    }
}

impl<P: Platform> Drop for PlotEngine<P> {
    fn drop(&mut self) {
        if let Err(err) = self.lifecycle.get_mut().deinit() {
            log::warn!("Failed to release surface on drop: {}", err);
        }
    }
}
