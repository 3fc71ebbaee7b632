//! Backend abstraction layer
//!
//! Provides the collaborator traits the engine drives, plus two
//! implementations: a wgpu/winit backend and a headless dummy backend.

pub mod traits;

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "native")]
pub mod wgpu_backend;

pub use traits::*;
