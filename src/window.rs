//! Window management using winit
//!
//! The engine polls the window from its own frame loop instead of handing
//! control to winit, so events are pumped with
//! [`EventLoopExtPumpEvents::pump_events`] once per frame.
//!
//! winit allows one event loop per process. [`WinitEventLoop`] is created
//! once by the platform, lent to each window and given back when the window
//! is destroyed. On Linux and Windows it is built with `with_any_thread` so
//! that a background frame loop can own it; macOS requires the main thread.
//!
//! On Windows, messages for a window are queued on the thread that created
//! it. There the event loop and every window must be created and pumped on
//! the thread that built the event loop: a surface initialized on the main
//! thread can only be run inline, and `run_async` works only when the loop
//! thread creates the surface itself. [`WinitWindow::check_thread`] reports
//! a violation instead of silently losing events.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use winit::{
    dpi::LogicalSize,
    error::EventLoopError,
    event::{Event, WindowEvent},
    event_loop::{EventLoop, EventLoopBuilder},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window as RawWindow, WindowBuilder},
};

use crate::backend::traits::{BackendError, BackendResult, Extent, PlatformWindow};

/// The process-wide winit event loop.
pub struct WinitEventLoop {
    inner: EventLoop<()>,
    /// Thread that built the event loop
    owner: ThreadId,
}

// SAFETY: the event loop moves between threads but is only ever used through
// `&mut` by its current owner: the platform between surfaces (inside the
// engine's lifecycle lock), or one window while it exists (inside the lock or
// the single frame loop that checked it out). It is never accessed from two
// threads at once. Where the OS binds window messages to the creating thread
// (Windows), `check_thread` refuses window creation and event pumping on any
// thread but `owner`, so the platform state is only touched there.
unsafe impl Send for WinitEventLoop {}

impl WinitEventLoop {
    pub fn new() -> Result<Self, EventLoopError> {
        #[allow(unused_mut)]
        let mut builder = EventLoopBuilder::new();

        #[cfg(target_os = "linux")]
        {
            use winit::platform::x11::EventLoopBuilderExtX11;
            builder.with_any_thread(true);
        }

        #[cfg(target_os = "windows")]
        {
            use winit::platform::windows::EventLoopBuilderExtWindows;
            builder.with_any_thread(true);
        }

        let inner = builder.build()?;
        Ok(Self {
            inner,
            owner: thread::current().id(),
        })
    }

    /// Whether the calling thread may create windows on and pump this loop.
    pub fn check_thread(&self) -> BackendResult<()> {
        let current = thread::current().id();
        if cfg!(target_os = "windows") && current != self.owner {
            return Err(BackendError::Unsupported(format!(
                "event loop belongs to {:?}, called from {:?}",
                self.owner, current
            )));
        }
        Ok(())
    }
}

/// Wrapper around winit window with additional state
pub struct WinitWindow {
    event_loop: WinitEventLoop,
    window: Arc<RawWindow>,
    egui_state: Option<egui_winit::State>,
    close_requested: bool,
}

// SAFETY: see `WinitEventLoop`. The raw window and the egui-winit state
// (clipboard handles) are used under the same exclusive access and, on
// Windows, only on the event loop's owner thread.
unsafe impl Send for WinitWindow {}

impl WinitWindow {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: WinitEventLoop,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, (WinitEventLoop, BackendError)> {
        if let Err(err) = event_loop.check_thread() {
            return Err((event_loop, err));
        }
        // Logical size, so the window scales with the monitor's content scale
        let built = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(initial_size(width, height))
            .build(&event_loop.inner);

        match built {
            Ok(window) => Ok(Self {
                event_loop,
                window: Arc::new(window),
                egui_state: None,
                close_requested: false,
            }),
            Err(err) => Err((
                event_loop,
                BackendError::WindowCreationFailed(err.to_string()),
            )),
        }
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<RawWindow> {
        Arc::clone(&self.window)
    }

    /// Close the window and give the event loop back.
    pub fn into_event_loop(self) -> WinitEventLoop {
        self.event_loop
    }
}

impl PlatformWindow for WinitWindow {
    fn poll_events(&mut self) {
        let window = &self.window;
        let egui_state = &mut self.egui_state;
        let close_requested = &mut self.close_requested;

        let status = self
            .event_loop
            .inner
            .pump_events(Some(Duration::ZERO), |event, _elwt| {
                if let Event::WindowEvent { event, window_id } = event {
                    if window_id != window.id() {
                        return;
                    }
                    if let Some(state) = egui_state.as_mut() {
                        let _ = state.on_window_event(window, &event);
                    }
                    if let WindowEvent::CloseRequested = event {
                        *close_requested = true;
                    }
                }
            });

        if let PumpStatus::Exit(code) = status {
            log::debug!("winit event loop exited with code {}", code);
            self.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn framebuffer_size(&self) -> Extent {
        let size = self.window.inner_size();
        Extent::new(size.width, size.height)
    }

    fn is_iconified(&self) -> bool {
        self.window.is_minimized().unwrap_or(false)
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn check_thread(&self) -> BackendResult<()> {
        self.event_loop.check_thread()
    }

    fn attach_ui(&mut self, ctx: &egui::Context) {
        self.egui_state = Some(egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            self.window.as_ref(),
            Some(self.window.scale_factor() as f32),
            None,
        ));
    }

    fn detach_ui(&mut self) {
        self.egui_state = None;
    }

    fn take_ui_input(&mut self) -> egui::RawInput {
        match self.egui_state.as_mut() {
            Some(state) => state.take_egui_input(&self.window),
            None => {
                let size = self.framebuffer_size();
                egui::RawInput {
                    screen_rect: Some(egui::Rect::from_min_size(
                        egui::Pos2::ZERO,
                        egui::vec2(size.width as f32, size.height as f32),
                    )),
                    ..Default::default()
                }
            }
        }
    }

    fn handle_ui_output(&mut self, output: egui::PlatformOutput) {
        if let Some(state) = self.egui_state.as_mut() {
            state.handle_platform_output(&self.window, output);
        }
    }
}

/// Requested inner size in logical pixels.
fn initial_size(width: u32, height: u32) -> LogicalSize<f64> {
    LogicalSize::new(f64::from(width), f64::from(height))
}
