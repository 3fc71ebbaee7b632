//! Engine error types.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::traits::BackendError;

/// Errors surfaced by [`PlotEngine`](crate::PlotEngine) operations.
///
/// Cloneable so that every caller waiting on a loop receives its result.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("Windowing subsystem unavailable: {0}")]
    WindowUnavailable(#[source] BackendError),
    #[error("Required graphics API support is missing")]
    ApiNotSupported,
    #[error("Failed to initialize surface: {0}")]
    Initialization(#[source] BackendError),
    #[error("Fatal device error: {0}")]
    Device(#[source] BackendError),
    #[error("Surface is owned by a running frame loop")]
    SurfaceBusy,
    #[error("A frame loop is already attached to this engine")]
    AlreadyRunning,
    #[error("wait() called from the frame loop thread")]
    WaitFromLoopThread,
    #[error("Failed to spawn frame loop thread: {0}")]
    Spawn(#[source] Arc<io::Error>),
    #[error("Draw callback panicked: {0}")]
    DrawerPanicked(String),
    #[error("Frame loop thread panicked: {0}")]
    LoopPanicked(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Spawn(Arc::new(err))
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ApiNotSupported;
        assert_eq!(err.to_string(), "Required graphics API support is missing");

        let err = EngineError::Device(BackendError::DeviceLost);
        assert_eq!(err.to_string(), "Fatal device error: Device lost");
    }

    #[test]
    fn test_spawn_error_clones_share_source() {
        let err = EngineError::from(io::Error::new(io::ErrorKind::Other, "no threads"));
        let copy = err.clone();
        match (&err, &copy) {
            (EngineError::Spawn(a), EngineError::Spawn(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("unexpected errors: {other:?}"),
        }
        assert_eq!(copy.to_string(), "Failed to spawn frame loop thread: no threads");
    }

    #[test]
    fn test_panic_message_variants() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
