//! Common utilities for engine integration tests.
//!
//! Every test drives the engine through the dummy backend, so no window or
//! GPU is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use plot_engine::backend::dummy::{DummyCall, DummyControl, DummyPlatform};
use plot_engine::{EngineConfig, PlotEngine};

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type TestEngine = Arc<PlotEngine<DummyPlatform>>;

/// Install the test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config with short sleeps so loops react quickly.
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_title("test")
        .with_idle_sleep(Duration::from_millis(1))
}

/// Create an engine on a fresh dummy platform.
pub fn dummy_engine() -> (TestEngine, Arc<DummyControl>) {
    dummy_engine_with(test_config())
}

pub fn dummy_engine_with(config: EngineConfig) -> (TestEngine, Arc<DummyControl>) {
    init_logging();
    let platform = DummyPlatform::new();
    let control = platform.control();
    control.set_frame_interval(Duration::from_millis(1));
    let engine = PlotEngine::new(platform, config).expect("valid config");
    (Arc::new(engine), control)
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Wait until the engine has presented at least `count` more frames.
pub fn wait_for_frames(engine: &TestEngine, count: u64) -> bool {
    let start = engine.frames_presented();
    wait_until(|| engine.frames_presented() >= start + count)
}

/// Short name of a recorded call, for comparing call sequences.
pub fn call_name(call: &DummyCall) -> &'static str {
    match call {
        DummyCall::CreateWindow { .. } => "create_window",
        DummyCall::DestroyWindow => "destroy_window",
        DummyCall::QuerySupport => "query_support",
        DummyCall::CreateDevice => "create_device",
        DummyCall::ReleaseDevice => "release_device",
        DummyCall::CreateSurface => "create_surface",
        DummyCall::DestroySurface => "destroy_surface",
        DummyCall::SetupSurfaceResources(_) => "setup_surface_resources",
        DummyCall::TeardownSurfaceResources => "teardown_surface_resources",
        DummyCall::ResizeSurfaceResources(_) => "resize_surface_resources",
        DummyCall::AcquireFrame => "acquire_frame",
        DummyCall::RenderFrame { .. } => "render_frame",
        DummyCall::PresentFrame => "present_frame",
        DummyCall::WaitIdle => "wait_idle",
        DummyCall::SetTitle(_) => "set_title",
    }
}

/// Names of all lifecycle calls, leaving out per-frame traffic.
pub fn lifecycle_calls(control: &DummyControl) -> Vec<&'static str> {
    control
        .calls()
        .iter()
        .filter(|call| {
            !matches!(
                call,
                DummyCall::AcquireFrame
                    | DummyCall::RenderFrame { .. }
                    | DummyCall::PresentFrame
                    | DummyCall::ResizeSurfaceResources(_)
                    | DummyCall::SetTitle(_)
            )
        })
        .map(call_name)
        .collect()
}

/// The full init sequence followed by the full teardown sequence.
pub const INIT_THEN_TEARDOWN: &[&str] = &[
    "create_window",
    "query_support",
    "create_device",
    "create_surface",
    "setup_surface_resources",
    "wait_idle",
    "teardown_surface_resources",
    "destroy_surface",
    "destroy_window",
    "release_device",
];
