use crate::{CameraError, ConfigError, DeviceBuffer, NodeWrite, RetrieveError};
use std::time::Duration;

/// Identity of an enumerated camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub model: String,
    pub serial: String,
}

/// Entry point of a camera backend: lists devices and opens one.
pub trait CameraSystem: Send + Sync {
    fn enumerate(&self) -> Vec<DeviceDescriptor>;

    /// Open and initialize the device at `index`.
    fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An initialized camera.
///
/// Only one thread drives a device at a time; implementations need `Send`
/// so a device can move into the acquisition worker and back.
pub trait CameraDevice: Send {
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Write one trigger node. Writing source or activation while the
    /// trigger mode is on is undefined on real hardware.
    fn write_trigger_node(&mut self, write: NodeWrite) -> Result<(), ConfigError>;

    /// Fire one software trigger. Only meaningful in software trigger mode.
    fn execute_software_trigger(&mut self) -> Result<(), CameraError>;

    fn is_streaming(&self) -> bool;

    fn begin_stream(&mut self) -> Result<(), CameraError>;

    fn end_stream(&mut self) -> Result<(), CameraError>;

    /// Wait up to `timeout` for the next buffer. Incomplete images are
    /// returned as buffers with `is_complete() == false`.
    fn retrieve_next(&mut self, timeout: Duration) -> Result<DeviceBuffer, RetrieveError>;

    /// Hand a buffer back to the device. Must be called exactly once per
    /// buffer returned by `retrieve_next`.
    fn release(&mut self, buffer: DeviceBuffer);

    /// Deinitialize the device. The device must not be used afterwards.
    fn close(&mut self);
}
