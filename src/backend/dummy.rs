//! Dummy backend for testing and development.
//!
//! This backend doesn't open windows or touch a GPU. Every collaborator call
//! is recorded in a shared [`DummyControl`], which tests also use to script
//! window size, close requests, failures and acquire/present outcomes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::egui_integration::DrawData;

use super::traits::{
    Acquire, BackendError, BackendResult, Extent, FrameDevice, Platform, PlatformWindow,
    PresentStatus,
};

/// A recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCall {
    CreateWindow {
        title: String,
        width: u32,
        height: u32,
    },
    DestroyWindow,
    QuerySupport,
    CreateDevice,
    ReleaseDevice,
    CreateSurface,
    DestroySurface,
    SetupSurfaceResources(Extent),
    TeardownSurfaceResources,
    ResizeSurfaceResources(Extent),
    AcquireFrame,
    RenderFrame { primitives: usize },
    PresentFrame,
    WaitIdle,
    SetTitle(String),
}

/// Step at which the dummy backend should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    CreateWindow,
    /// `query_support` reports the graphics API as missing.
    QuerySupport,
    CreateDevice,
    CreateSurface,
    SetupSurfaceResources,
    ResizeSurfaceResources,
    WaitIdle,
}

/// Shared script and call log for a [`DummyPlatform`].
#[derive(Debug)]
pub struct DummyControl {
    calls: Mutex<Vec<DummyCall>>,
    framebuffer: Mutex<Extent>,
    iconified: AtomicBool,
    close_requested: AtomicBool,
    /// Poll count at which the window reports a close request; `u64::MAX` when unset.
    close_at_poll: AtomicU64,
    polls: AtomicU64,
    fail_at: Mutex<Option<FailurePoint>>,
    acquire_script: Mutex<VecDeque<BackendResult<Acquire<()>>>>,
    present_script: Mutex<VecDeque<BackendResult<PresentStatus>>>,
    frame_interval: Mutex<Duration>,
    /// Windows only accept event pumping from the thread that created them
    thread_affine: AtomicBool,
}

impl Default for DummyControl {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            framebuffer: Mutex::new(Extent::new(800, 600)),
            iconified: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            close_at_poll: AtomicU64::new(u64::MAX),
            polls: AtomicU64::new(0),
            fail_at: Mutex::new(None),
            acquire_script: Mutex::new(VecDeque::new()),
            present_script: Mutex::new(VecDeque::new()),
            frame_interval: Mutex::new(Duration::from_millis(1)),
            thread_affine: AtomicBool::new(false),
        }
    }
}

impl DummyControl {
    fn record(&self, call: DummyCall) {
        log::trace!("DummyBackend: {:?}", call);
        self.calls.lock().push(call);
    }

    fn fails_at(&self, point: FailurePoint) -> bool {
        *self.fail_at.lock() == Some(point)
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<DummyCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &DummyCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count_where(&self, pred: impl Fn(&DummyCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Extents passed to `resize_surface_resources`, in order.
    pub fn resizes(&self) -> Vec<Extent> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DummyCall::ResizeSurfaceResources(extent) => Some(*extent),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn set_framebuffer_size(&self, extent: Extent) {
        *self.framebuffer.lock() = extent;
    }

    pub fn framebuffer_size(&self) -> Extent {
        *self.framebuffer.lock()
    }

    pub fn set_iconified(&self, iconified: bool) {
        self.iconified.store(iconified, Ordering::Release);
    }

    /// Make the window report a close request.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// Request a close once `polls` more event polls have happened.
    pub fn close_after_polls(&self, polls: u64) {
        let now = self.polls.load(Ordering::Acquire);
        self.close_at_poll
            .store(now.saturating_add(polls), Ordering::Release);
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Acquire)
    }

    /// Fail at `point` from now on, or stop failing with `None`.
    pub fn fail_at(&self, point: Option<FailurePoint>) {
        *self.fail_at.lock() = point;
    }

    /// Queue the outcome of a future `acquire_frame`. Unscripted acquires succeed.
    pub fn push_acquire(&self, outcome: BackendResult<Acquire<()>>) {
        self.acquire_script.lock().push_back(outcome);
    }

    /// Queue the outcome of a future `present_frame`. Unscripted presents succeed.
    pub fn push_present(&self, outcome: BackendResult<PresentStatus>) {
        self.present_script.lock().push_back(outcome);
    }

    /// Time each event poll blocks for, standing in for vsync.
    pub fn set_frame_interval(&self, interval: Duration) {
        *self.frame_interval.lock() = interval;
    }

    /// Make windows refuse to be driven from any thread but their creator,
    /// as native windows on Windows do.
    pub fn set_thread_affine(&self, affine: bool) {
        self.thread_affine.store(affine, Ordering::Release);
    }
}

/// Headless [`Platform`] recording into a [`DummyControl`].
#[derive(Debug, Clone, Default)]
pub struct DummyPlatform {
    control: Arc<DummyControl>,
}

impl DummyPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the control handle shared with every window and device.
    pub fn control(&self) -> Arc<DummyControl> {
        Arc::clone(&self.control)
    }
}

#[derive(Debug)]
pub struct DummyWindow {
    control: Arc<DummyControl>,
    title: String,
    owner: ThreadId,
}

impl DummyWindow {
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl PlatformWindow for DummyWindow {
    fn poll_events(&mut self) {
        let interval = *self.control.frame_interval.lock();
        if !interval.is_zero() {
            thread::sleep(interval);
        }
        let polls = self.control.polls.fetch_add(1, Ordering::AcqRel) + 1;
        let close_at = self.control.close_at_poll.load(Ordering::Acquire);
        if polls >= close_at {
            // one-shot: a later window starts open again
            self.control.close_at_poll.store(u64::MAX, Ordering::Release);
            self.control.request_close();
        }
    }

    fn should_close(&self) -> bool {
        self.control.close_requested.load(Ordering::Acquire)
    }

    fn framebuffer_size(&self) -> Extent {
        self.control.framebuffer_size()
    }

    fn is_iconified(&self) -> bool {
        self.control.iconified.load(Ordering::Acquire)
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.control.record(DummyCall::SetTitle(self.title.clone()));
    }

    fn check_thread(&self) -> BackendResult<()> {
        let current = thread::current().id();
        if self.control.thread_affine.load(Ordering::Acquire) && current != self.owner {
            return Err(BackendError::Unsupported(format!(
                "window was created on {:?} and cannot be driven from {:?}",
                self.owner, current
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DummyDevice {
    control: Arc<DummyControl>,
}

/// Surface whose resources exist while `extent` is set.
#[derive(Debug, Default)]
pub struct DummySurface {
    extent: Option<Extent>,
}

#[derive(Debug)]
pub struct DummyFrame;

impl FrameDevice for DummyDevice {
    type Window = DummyWindow;
    type Surface = DummySurface;
    type Frame = DummyFrame;

    fn create_surface(&mut self, _window: &DummyWindow) -> BackendResult<DummySurface> {
        if self.control.fails_at(FailurePoint::CreateSurface) {
            return Err(BackendError::SurfaceCreationFailed(
                "scripted failure".to_string(),
            ));
        }
        self.control.record(DummyCall::CreateSurface);
        Ok(DummySurface::default())
    }

    fn destroy_surface(&mut self, _surface: DummySurface) {
        self.control.record(DummyCall::DestroySurface);
    }

    fn setup_surface_resources(
        &mut self,
        surface: &mut DummySurface,
        extent: Extent,
        _min_image_count: u32,
    ) -> BackendResult<()> {
        if self.control.fails_at(FailurePoint::SetupSurfaceResources) {
            return Err(BackendError::SurfaceSetupFailed(
                "scripted failure".to_string(),
            ));
        }
        self.control.record(DummyCall::SetupSurfaceResources(extent));
        surface.extent = Some(extent);
        Ok(())
    }

    fn teardown_surface_resources(&mut self, surface: &mut DummySurface) {
        self.control.record(DummyCall::TeardownSurfaceResources);
        surface.extent = None;
    }

    fn resize_surface_resources(
        &mut self,
        surface: &mut DummySurface,
        extent: Extent,
        _min_image_count: u32,
    ) -> BackendResult<()> {
        if self.control.fails_at(FailurePoint::ResizeSurfaceResources) {
            return Err(BackendError::DeviceLost);
        }
        self.control.record(DummyCall::ResizeSurfaceResources(extent));
        surface.extent = Some(extent);
        Ok(())
    }

    fn acquire_frame(&mut self, surface: &mut DummySurface) -> BackendResult<Acquire<DummyFrame>> {
        if surface.extent.is_none() {
            return Err(BackendError::Other(
                "surface resources are not set up".to_string(),
            ));
        }
        self.control.record(DummyCall::AcquireFrame);
        let outcome = self
            .control
            .acquire_script
            .lock()
            .pop_front()
            .unwrap_or(Ok(Acquire::Ready(())))?;
        Ok(match outcome {
            Acquire::Ready(()) => Acquire::Ready(DummyFrame),
            Acquire::Suboptimal(()) => Acquire::Suboptimal(DummyFrame),
            Acquire::Outdated => Acquire::Outdated,
        })
    }

    fn render_frame(
        &mut self,
        _surface: &mut DummySurface,
        _frame: &mut DummyFrame,
        draw_data: &DrawData,
        _clear_color: [f32; 4],
    ) -> BackendResult<()> {
        self.control.record(DummyCall::RenderFrame {
            primitives: draw_data.paint_jobs.len(),
        });
        Ok(())
    }

    fn present_frame(
        &mut self,
        _surface: &mut DummySurface,
        _frame: DummyFrame,
    ) -> BackendResult<PresentStatus> {
        self.control.record(DummyCall::PresentFrame);
        self.control
            .present_script
            .lock()
            .pop_front()
            .unwrap_or(Ok(PresentStatus::Presented))
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        self.control.record(DummyCall::WaitIdle);
        if self.control.fails_at(FailurePoint::WaitIdle) {
            return Err(BackendError::DeviceLost);
        }
        Ok(())
    }
}

impl Platform for DummyPlatform {
    type Window = DummyWindow;
    type Device = DummyDevice;

    fn create_window(&mut self, title: &str, width: u32, height: u32) -> BackendResult<DummyWindow> {
        if self.control.fails_at(FailurePoint::CreateWindow) {
            return Err(BackendError::WindowCreationFailed(
                "scripted failure".to_string(),
            ));
        }
        self.control.record(DummyCall::CreateWindow {
            title: title.to_string(),
            width,
            height,
        });
        self.control.close_requested.store(false, Ordering::Release);
        Ok(DummyWindow {
            control: Arc::clone(&self.control),
            title: title.to_string(),
            owner: thread::current().id(),
        })
    }

    fn destroy_window(&mut self, _window: DummyWindow) {
        self.control.record(DummyCall::DestroyWindow);
    }

    fn query_support(&self, _window: &DummyWindow) -> bool {
        self.control.record(DummyCall::QuerySupport);
        !self.control.fails_at(FailurePoint::QuerySupport)
    }

    fn create_device(&mut self, _window: &DummyWindow) -> BackendResult<DummyDevice> {
        if self.control.fails_at(FailurePoint::CreateDevice) {
            return Err(BackendError::DeviceCreationFailed(
                "scripted failure".to_string(),
            ));
        }
        self.control.record(DummyCall::CreateDevice);
        Ok(DummyDevice {
            control: Arc::clone(&self.control),
        })
    }

    fn release_device(&mut self, _device: DummyDevice) {
        self.control.record(DummyCall::ReleaseDevice);
    }
}
