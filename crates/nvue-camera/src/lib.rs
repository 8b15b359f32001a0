//! Camera device interface for triggered machine-vision cameras.
//!
//! Backends implement `CameraSystem` (enumeration) and `CameraDevice`
//! (trigger node writes, streaming, frame retrieval). Frames come out of a
//! device as `DeviceBuffer`s, which must be handed back with
//! `CameraDevice::release` exactly once.

pub mod device;
pub mod error;
pub mod frame;
pub mod simulated;
pub mod trigger;

#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use device::{CameraDevice, CameraSystem, DeviceDescriptor};
pub use error::{CameraError, ConfigError, RetrieveError};
pub use frame::{DeviceBuffer, Frame, PixelFormat};
pub use simulated::{SimulatedCamera, SimulatedFeed, SimulatedProbe, SimulatedSystem};
pub use trigger::{NodeWrite, TriggerActivation, TriggerConfig, TriggerMode, TriggerSource};

#[cfg(feature = "v4l2")]
pub use v4l2::{V4l2Camera, V4l2System};
